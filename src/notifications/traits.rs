use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// One reminder delivery handed to every channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub reminder_id: String,
    pub message: String,
    /// Lowercase priority name (`high`, `normal`, `low`).
    pub priority: String,
    pub scheduled_time: DateTime<Utc>,
}

impl Notification {
    /// Single-line text used by channels without structured payloads.
    pub fn render(&self) -> String {
        let marker = if self.priority == "high" { "[!] " } else { "" };
        format!(
            "{marker}Reminder: {} (due {})",
            self.message,
            self.scheduled_time.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// Delivery transport for reminders.
///
/// `Err` means the attempt failed; the daemon records it and moves on.
pub trait NotificationChannel: Send + Sync {
    /// Stable name, recorded on every notification event.
    fn name(&self) -> &str;

    fn send<'a>(
        &'a self,
        notification: &'a Notification,
        target: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}
