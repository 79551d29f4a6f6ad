use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    /// Daemon tick interval.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    /// Upper bound on a single channel dispatch.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
    /// Recipient handed to every notification channel.
    #[serde(default = "default_target")]
    pub target: String,
    /// Inactive reminders notified longer ago than this are compacted.
    #[serde(default = "default_compact_after_days")]
    pub compact_after_days: u32,
}

fn default_poll_secs() -> u64 {
    60
}

fn default_dispatch_timeout_secs() -> u64 {
    10
}

fn default_target() -> String {
    "local".into()
}

fn default_compact_after_days() -> u32 {
    30
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            target: default_target(),
            compact_after_days: default_compact_after_days(),
        }
    }
}
