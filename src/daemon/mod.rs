use crate::config::Config;
use crate::reminders::{ReminderDaemon, ReminderStore};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

mod state;
mod supervisor;

use state::spawn_state_writer;
use supervisor::spawn_component_supervisor;

const STATUS_FLUSH_SECONDS: u64 = 5;
const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 60;
const MAX_RESTARTS: u32 = 10;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run the reminder daemon under supervision until Ctrl-C.
pub async fn run(config: Arc<Config>) -> Result<()> {
    let store = Arc::new(ReminderStore::open_for_config(&config).await?);
    let daemon = Arc::new(ReminderDaemon::from_config(Arc::clone(&store), &config));
    let interval = Duration::from_secs(config.reminders.poll_secs.max(1));
    let shutdown = CancellationToken::new();

    let handles = spawn_components(&config, daemon, store, interval, &shutdown);

    println!("◆ taskwarden daemon started");
    println!("   reminders polled every {}s", interval.as_secs());
    println!("   Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    shutdown.cancel();

    for handle in handles {
        let abort = handle.abort_handle();
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            tracing::warn!("daemon component did not stop in time; aborting");
            abort.abort();
        }
    }

    Ok(())
}

pub fn state_file_path(config: &Config) -> PathBuf {
    state::state_file_path(config)
}

fn spawn_components(
    config: &Config,
    daemon: Arc<ReminderDaemon>,
    store: Arc<ReminderStore>,
    interval: Duration,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let channels = daemon.channel_names();
    if channels.is_empty() {
        tracing::warn!("no notification channels configured; due reminders will stay active");
    }

    let mut handles = vec![spawn_state_writer(
        state_file_path(config),
        store,
        interval.as_secs(),
        channels,
        shutdown.clone(),
    )];

    let token = shutdown.clone();
    handles.push(spawn_component_supervisor(
        "reminders",
        INITIAL_BACKOFF_SECS,
        MAX_BACKOFF_SECS,
        MAX_RESTARTS,
        shutdown.clone(),
        move || {
            let daemon = Arc::clone(&daemon);
            let token = token.clone();
            async move { daemon.run(interval, token).await }
        },
    ));

    handles
}
