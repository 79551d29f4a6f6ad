use super::store::ReminderStore;
use super::types::{NotificationEvent, Reminder};
use crate::config::Config;
use crate::error::NotificationError;
use crate::notifications::{NotificationChannel, build_channels};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Counters for one daemon tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Reminders returned by the due query.
    pub due: usize,
    /// Reminders whose active flag this tick turned off.
    pub notified: usize,
    /// Channel dispatch attempts made.
    pub attempts: usize,
    pub failures: usize,
    /// Due reminders left alone (claimed elsewhere, already inactive, or no channels).
    pub skipped: usize,
}

enum Outcome {
    Notified { attempts: usize, failures: usize },
    Skipped,
}

/// Periodically fires due reminders through the configured channels.
pub struct ReminderDaemon {
    store: Arc<ReminderStore>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    target: String,
    dispatch_timeout: Duration,
}

impl ReminderDaemon {
    pub fn new(
        store: Arc<ReminderStore>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        target: impl Into<String>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            channels,
            target: target.into(),
            dispatch_timeout,
        }
    }

    pub fn from_config(store: Arc<ReminderStore>, config: &Config) -> Self {
        Self::new(
            store,
            build_channels(config),
            config.reminders.target.clone(),
            Duration::from_secs(config.reminders.dispatch_timeout_secs),
        )
    }

    pub fn store(&self) -> &Arc<ReminderStore> {
        &self.store
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels
            .iter()
            .map(|channel| channel.name().to_string())
            .collect()
    }

    /// Process every reminder due at `now`. Failures on one reminder are
    /// logged and do not stop the others.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let due = self.store.due(now).await?;
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };

        for reminder in &due {
            match self.process(reminder, now).await {
                Ok(Outcome::Notified { attempts, failures }) => {
                    report.notified += 1;
                    report.attempts += attempts;
                    report.failures += failures;
                }
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(error) => {
                    report.skipped += 1;
                    tracing::warn!(
                        reminder_id = %reminder.id,
                        error = %error,
                        "reminder processing failed; will retry next tick"
                    );
                }
            }
        }

        if report.due > 0 {
            tracing::info!(
                due = report.due,
                notified = report.notified,
                attempts = report.attempts,
                failures = report.failures,
                "reminder tick complete"
            );
        }
        Ok(report)
    }

    async fn process(&self, reminder: &Reminder, now: DateTime<Utc>) -> Result<Outcome> {
        // Claim, then re-read: the critical section covers check and mark.
        let Some(_claim) = self.store.claim(&reminder.id) else {
            tracing::debug!(reminder_id = %reminder.id, "reminder already in flight");
            return Ok(Outcome::Skipped);
        };
        let Some(current) = self.store.get(&reminder.id).await? else {
            return Ok(Outcome::Skipped);
        };
        if !current.is_due(now) {
            return Ok(Outcome::Skipped);
        }

        if self.channels.is_empty() {
            tracing::warn!(
                reminder_id = %current.id,
                "no notification channels configured; reminder stays active"
            );
            return Ok(Outcome::Skipped);
        }

        let delivered = self.store.succeeded_channels(&current.id).await?;
        let pending: Vec<&Arc<dyn NotificationChannel>> = self
            .channels
            .iter()
            .filter(|channel| !delivered.contains(channel.name()))
            .collect();

        let notification = current.notification();
        let dispatches = pending.iter().map(|channel| {
            let notification = &notification;
            async move {
                let attempted_at = Utc::now();
                let result = match tokio::time::timeout(
                    self.dispatch_timeout,
                    channel.send(notification, &self.target),
                )
                .await
                {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(NotificationError::Dispatch {
                        channel: channel.name().to_string(),
                        message: format!("{e:#}"),
                    }),
                    Err(_) => Err(NotificationError::Timeout {
                        channel: channel.name().to_string(),
                        timeout_secs: self.dispatch_timeout.as_secs(),
                    }),
                };
                (channel.name().to_string(), attempted_at, result)
            }
        });
        let results = join_all(dispatches).await;

        let attempts = results.len();
        let mut failures = 0;
        for (channel, attempted_at, result) in results {
            if let Err(error) = &result {
                failures += 1;
                tracing::warn!(
                    reminder_id = %current.id,
                    channel = %channel,
                    kind = %error.kind(),
                    error = %error,
                    "notification dispatch failed"
                );
            }
            self.store
                .record_event(&NotificationEvent {
                    reminder_id: current.id.clone(),
                    channel,
                    attempted_at,
                    success: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                })
                .await?;
        }

        // Marked after an attempt even when every channel failed.
        let flipped = self.store.mark_notified(&current.id, now).await?;
        if !flipped {
            return Ok(Outcome::Skipped);
        }
        Ok(Outcome::Notified { attempts, failures })
    }

    /// Tick every `interval` until `token` is cancelled. A failing or
    /// panicking tick is logged and the loop continues.
    pub async fn run(self: Arc<Self>, interval: Duration, token: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = interval.as_secs(),
            channels = self.channels.len(),
            "reminder daemon started"
        );

        loop {
            tokio::select! {
                () = token.cancelled() => {
                    tracing::info!("reminder daemon stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let daemon = Arc::clone(&self);
            let handle = tokio::spawn(async move { daemon.tick(Utc::now()).await });
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(error)) => tracing::warn!(error = %error, "reminder tick failed"),
                Err(join_error) => tracing::error!(error = %join_error, "reminder tick panicked"),
            }
        }
    }
}
