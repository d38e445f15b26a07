use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Retry an operation with a caller-supplied backoff strategy
///
/// `backoff_fn` receives the number of the attempt that just failed. At least
/// one attempt is always made.
pub async fn with_retry_and_backoff<T, E, F, B>(
    operation: F,
    max_attempts: usize,
    log_context: &str,
    backoff_fn: B,
) -> Result<T, E>
where
    F: Fn() -> futures::future::BoxFuture<'static, Result<T, E>> + Send + Sync,
    E: Display + Send,
    B: Fn(usize) -> Duration + Send + Sync,
    T: Send,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            // Success case - log if retried and return result
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded after {} attempts", log_context, attempt);
                }
                return Ok(value);
            }

            // Error case - either retry or return error
            Err(e) => {
                if attempt >= max_attempts {
                    error!("{} failed after {} attempts: {}", log_context, attempt, e);
                    return Err(e);
                }

                let delay = backoff_fn(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    log_context, attempt, max_attempts, e, delay
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Helper to create a constant backoff duration
pub fn constant_backoff(duration_ms: u64) -> impl Fn(usize) -> Duration + Send + Sync {
    move |_| Duration::from_millis(duration_ms)
}
