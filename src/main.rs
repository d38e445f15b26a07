use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use jobmarket_lib::api::types::{JobFeedQuery, LoginInput};
use jobmarket_lib::{AppState, Config, NoticeLevel};

/// Credentials used to sign in when no session is stored
const ENV_EMAIL: &str = "JOBMARKET_EMAIL";
const ENV_PASSWORD: &str = "JOBMARKET_PASSWORD";

const FEED_PAGE_SIZE: u32 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    let env_file_path = dotenvy::dotenv().ok();

    // Initialize the tracing subscriber for structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "jobmarket=debug,jobmarket_lib=debug,warn".into()
            } else {
                "jobmarket=info,jobmarket_lib=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    info!("jobmarket starting");
    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    };

    let config = Config::from_env()?;
    let state = AppState::new(config);

    // Render notices the way a UI would render toasts
    let mut notices = state.notices.subscribe();
    let notice_printer = tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => match notice.level {
                    NoticeLevel::Error => error!(message = %notice.message, "Notice"),
                    NoticeLevel::Warning => warn!(message = %notice.message, "Notice"),
                    NoticeLevel::Info | NoticeLevel::Success => {
                        info!(message = %notice.message, "Notice")
                    }
                },
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Notice printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut realtime_messages = state.realtime.channel().subscribe();
    let realtime_printer = tokio::spawn(async move {
        while let Ok(message) = realtime_messages.recv().await {
            info!(event = %message.event, data = %message.data, "Realtime message");
        }
    });

    let mut authenticated = state.initialize().await;
    if !authenticated {
        match (std::env::var(ENV_EMAIL), std::env::var(ENV_PASSWORD)) {
            (Ok(email), Ok(password)) => {
                match state.session.login(&LoginInput { email, password }).await {
                    Ok(user) => {
                        authenticated = true;
                        info!(
                            user_id = user.as_ref().map(|u| u.id.as_str()).unwrap_or_default(),
                            "Signed in"
                        );
                    }
                    Err(e) => error!(error = %e, "Login failed"),
                }
            }
            _ => info!(
                "No stored session. Set {} and {} to sign in.",
                ENV_EMAIL, ENV_PASSWORD
            ),
        }
    }

    let query = JobFeedQuery {
        limit: Some(FEED_PAGE_SIZE),
        ..Default::default()
    };
    match state.jobs.feed(&query).await {
        Ok(feed) => {
            info!(count = feed.jobs.len(), next_cursor = ?feed.next_cursor, "Fetched job feed");
            for job in &feed.jobs {
                info!(id = %job.id, title = %job.title, status = %job.status, suburb = %job.suburb, "Job");
            }
        }
        Err(e) => error!(error = %e, "Failed to fetch job feed"),
    }

    if authenticated && state.realtime.is_enabled() {
        info!("Listening for realtime events. Press Ctrl-C to exit.");
        tokio::signal::ctrl_c().await?;
    }

    state.shutdown().await;
    notice_printer.abort();
    realtime_printer.abort();
    info!("jobmarket stopped");
    Ok(())
}
