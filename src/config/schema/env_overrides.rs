use super::Config;
use std::path::PathBuf;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(workspace) = std::env::var("TASKWARDEN_WORKSPACE")
            && !workspace.is_empty()
        {
            self.workspace_dir = PathBuf::from(shellexpand::tilde(&workspace).into_owned());
        }

        if let Ok(raw) = std::env::var("TASKWARDEN_REMINDER_POLL_SECS")
            && let Ok(secs) = raw.parse::<u64>()
            && secs > 0
        {
            self.reminders.poll_secs = secs;
        }

        if let Ok(raw) = std::env::var("TASKWARDEN_CONFIRMATION_TIMEOUT_SECS")
            && let Ok(secs) = raw.parse::<u64>()
            && secs > 0
        {
            self.pipeline.confirmation_timeout_secs = secs;
        }

        if let Ok(url) = std::env::var("TASKWARDEN_WEBHOOK_URL")
            && !url.is_empty()
        {
            self.notifications.webhook_url = Some(url);
        }
    }
}
