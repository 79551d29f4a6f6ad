use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Emit reminders through the tracing log.
    #[serde(default = "default_log")]
    pub log: bool,
    /// Desktop toast via `notify-send` (Linux) or `osascript` (macOS).
    #[serde(default)]
    pub desktop: bool,
    /// Discord-compatible webhook endpoint.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_log() -> bool {
    true
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            log: default_log(),
            desktop: false,
            webhook_url: None,
        }
    }
}
