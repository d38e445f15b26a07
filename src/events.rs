use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Default capacity for the notice channel
pub const NOTICE_BUS_CAPACITY: usize = 64;

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient, user-facing message (rendered as a toast by the UI layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    /// Unique notice ID
    pub id: Uuid,
    pub level: NoticeLevel,
    pub message: String,
    /// Timestamp when the notice was raised
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Notice {
    /// Create a new notice
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            created_at: chrono::Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    /// Refresh token rejected; user has been logged out
    pub fn session_expired() -> Self {
        Self::error("Session expired. Please log in again.")
    }

    /// The server throttled us
    pub fn rate_limited() -> Self {
        Self::warning("Too many requests. Please slow down.")
    }

    /// No response was received
    pub fn network_unavailable() -> Self {
        Self::error("Network error. Please check your connection.")
    }
}

/// Statistics about notice bus activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoticeBusStats {
    /// Number of notices delivered to at least one subscriber
    pub notices_published: u64,
    /// Number of notices dropped (no subscribers)
    pub notices_dropped: u64,
}

/// Broadcast bus for user-facing notices
///
/// Publishing never fails: a notice raised while nobody is listening is
/// counted and dropped.
pub struct NoticeBus {
    /// The broadcast channel sender
    sender: broadcast::Sender<Notice>,
    /// Statistics about bus activity
    stats: Arc<RwLock<NoticeBusStats>>,
}

impl NoticeBus {
    /// Create a new notice bus with the specified capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "Creating notice bus");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            stats: Arc::new(RwLock::new(NoticeBusStats::default())),
        }
    }

    /// Get a receiver to subscribe to notices
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        trace!("New subscriber registered to notice bus");
        self.sender.subscribe()
    }

    /// Publish a notice to all subscribers, returning how many received it
    pub async fn publish(&self, notice: Notice) -> usize {
        info!(level = ?notice.level, message = %notice.message, "Raising notice");

        match self.sender.send(notice) {
            Ok(receivers) => {
                self.stats.write().await.notices_published += 1;
                receivers
            }
            Err(_) => {
                // Only possible error is "no receivers"
                self.stats.write().await.notices_dropped += 1;
                trace!("No subscribers for notice, dropped");
                0
            }
        }
    }

    /// Get current notice bus statistics
    pub async fn get_stats(&self) -> NoticeBusStats {
        self.stats.read().await.clone()
    }

    /// Get the current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new(NOTICE_BUS_CAPACITY)
    }
}

impl Clone for NoticeBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = NoticeBus::default();
        let mut rx = bus.subscribe();

        let receivers = bus.publish(Notice::rate_limited()).await;
        assert_eq!(receivers, 1);

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.message, "Too many requests. Please slow down.");
        assert_eq!(bus.get_stats().await.notices_published, 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_counted() {
        let bus = NoticeBus::default();
        assert_eq!(bus.publish(Notice::network_unavailable()).await, 0);

        let stats = bus.get_stats().await;
        assert_eq!(stats.notices_published, 0);
        assert_eq!(stats.notices_dropped, 1);
    }
}
