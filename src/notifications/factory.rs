use super::desktop::DesktopNotifier;
use super::log::LogNotifier;
use super::traits::NotificationChannel;
use super::webhook::WebhookNotifier;
use crate::config::Config;
use std::sync::Arc;

/// Build the channel set enabled in `[notifications]`, in a fixed order.
pub fn build_channels(config: &Config) -> Vec<Arc<dyn NotificationChannel>> {
    let settings = &config.notifications;
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    if settings.log {
        channels.push(Arc::new(LogNotifier));
    }
    if settings.desktop {
        channels.push(Arc::new(DesktopNotifier));
    }
    if let Some(url) = settings
        .webhook_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
    {
        channels.push(Arc::new(WebhookNotifier::with_timeout(
            url,
            config.reminders.dispatch_timeout_secs,
        )));
    }

    tracing::debug!(count = channels.len(), "notification channels configured");
    channels
}
