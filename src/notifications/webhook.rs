use super::traits::{Notification, NotificationChannel};
use anyhow::Context;
use reqwest::Client;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// JSON POST to a webhook URL.
///
/// The body carries a Discord-compatible `content` field plus the raw
/// reminder fields for other receivers.
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, 10)
    }

    pub fn with_timeout(url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            url: url.into(),
            client,
        }
    }
}

impl NotificationChannel for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    fn send<'a>(
        &'a self,
        notification: &'a Notification,
        target: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let body = json!({
                "content": notification.render(),
                "reminder_id": notification.reminder_id,
                "message": notification.message,
                "priority": notification.priority,
                "scheduled_time": notification.scheduled_time.to_rfc3339(),
                "target": target,
            });

            let response = self
                .client
                .post(&self.url)
                .json(&body)
                .send()
                .await
                .context("send webhook request")?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                anyhow::bail!("webhook returned {status}: {}", text.trim());
            }
            Ok(())
        })
    }
}
