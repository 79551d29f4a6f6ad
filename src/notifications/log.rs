use super::traits::{Notification, NotificationChannel};
use std::future::Future;
use std::pin::Pin;

/// Writes reminders to the tracing log. Always succeeds.
pub struct LogNotifier;

impl NotificationChannel for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn send<'a>(
        &'a self,
        notification: &'a Notification,
        target: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                reminder_id = %notification.reminder_id,
                priority = %notification.priority,
                target,
                "{}",
                notification.render()
            );
            Ok(())
        })
    }
}
