//! Common utilities shared by the pipeline and the realtime channel.

pub mod retry;

pub use retry::{constant_backoff, with_retry_and_backoff};
