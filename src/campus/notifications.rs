use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
}

struct Entry {
    notification: Notification,
    expires_at: Instant,
}

/// Short-lived toasts, newest first
///
/// Holds at most `limit` entries; each one expires `ttl` after it was pushed.
#[derive(Clone)]
pub struct NotificationTray {
    entries: Arc<Mutex<VecDeque<Entry>>>,
    limit: usize,
    ttl: Duration,
}

impl NotificationTray {
    pub fn new(limit: usize, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            limit: limit.max(1),
            ttl,
        }
    }

    pub async fn push(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: NotificationKind,
    ) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            title: title.into(),
            message: message.into(),
            kind,
            created_at: Utc::now(),
        };

        let mut entries = self.entries.lock().await;
        entries.push_front(Entry {
            notification: notification.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        entries.truncate(self.limit);

        notification
    }

    /// Unexpired notifications, newest first
    pub async fn current(&self) -> Vec<Notification> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|e| e.expires_at > now);
        entries.iter().map(|e| e.notification.clone()).collect()
    }
}
