use crate::config::Config;
use crate::reminders::ReminderStore;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, serde::Serialize)]
pub(super) struct DaemonStatus {
    pid: u32,
    poll_secs: u64,
    channels: Vec<String>,
    active_reminders: usize,
    written_at: String,
}

pub(super) fn state_file_path(config: &Config) -> PathBuf {
    config
        .config_path
        .parent()
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join("daemon_state.json")
}

pub(super) fn spawn_state_writer(
    path: PathBuf,
    store: Arc<ReminderStore>,
    poll_secs: u64,
    channels: Vec<String>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(parent) = path.parent()
            && let Err(error) = tokio::fs::create_dir_all(parent).await
        {
            tracing::warn!(%error, "failed to create state file directory");
        }

        let mut interval = tokio::time::interval(Duration::from_secs(super::STATUS_FLUSH_SECONDS));
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let active_reminders = match store.list(false).await {
                Ok(reminders) => reminders.len(),
                Err(error) => {
                    tracing::warn!(%error, "failed to count active reminders");
                    0
                }
            };
            let status = DaemonStatus {
                pid: std::process::id(),
                poll_secs,
                channels: channels.clone(),
                active_reminders,
                written_at: Utc::now().to_rfc3339(),
            };

            let data = serde_json::to_vec_pretty(&status).unwrap_or_else(|_| b"{}".to_vec());
            if let Err(error) = tokio::fs::write(&path, data).await {
                tracing::warn!(%error, "failed to write daemon state file");
            }
        }
    })
}
