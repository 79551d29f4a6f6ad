use super::types::{NewReminder, NotificationEvent, Priority, Reminder};
use crate::config::Config;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Fixed-width UTC timestamps, so text comparison in SQL is chronological.
const DB_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub(crate) fn to_db_time(t: DateTime<Utc>) -> String {
    t.format(DB_TIME_FORMAT).to_string()
}

fn parse_db_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid stored timestamp: {raw}"))
}

/// Owned access point for reminders and their notification events.
///
/// Writes serialize on `write_lock`; per-reminder processing is claimed
/// through [`ClaimGuard`].
pub struct ReminderStore {
    pool: SqlitePool,
    write_lock: tokio::sync::Mutex<()>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Exclusive processing right for one reminder; released on drop.
#[derive(Debug)]
pub struct ClaimGuard {
    id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ClaimGuard {
    pub fn reminder_id(&self) -> &str {
        &self.id
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl ReminderStore {
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create reminder directory: {}", parent.display())
            })?;
        }

        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .with_context(|| format!("Failed to open reminder DB: {}", db_path.display()))?;

        ensure_schema(&pool).await?;
        Ok(Self {
            pool,
            write_lock: tokio::sync::Mutex::new(()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub async fn open_for_config(config: &Config) -> Result<Self> {
        Self::open(&config.reminder_db_path()).await
    }

    pub async fn add(&self, new: NewReminder) -> Result<Reminder> {
        let message = new.message.trim();
        if message.is_empty() {
            anyhow::bail!("Reminder message must not be empty");
        }

        let reminder = Reminder {
            id: Uuid::new_v4().to_string(),
            message: message.to_string(),
            scheduled_time: new.scheduled_time,
            priority: new.priority,
            created_at: Utc::now(),
            is_active: true,
            notified_at: None,
        };

        let _write = self.write_lock.lock().await;
        sqlx::query(
            "INSERT INTO reminders (
                id, message, scheduled_time, priority, created_at, is_active, notified_at
             ) VALUES (?, ?, ?, ?, ?, 1, NULL)",
        )
        .bind(&reminder.id)
        .bind(&reminder.message)
        .bind(to_db_time(reminder.scheduled_time))
        .bind(reminder.priority.as_ref())
        .bind(to_db_time(reminder.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to insert reminder")?;

        tracing::debug!(reminder_id = %reminder.id, "reminder stored");
        Ok(reminder)
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Reminder>> {
        let sql = if include_inactive {
            "SELECT * FROM reminders ORDER BY scheduled_time ASC"
        } else {
            "SELECT * FROM reminders WHERE is_active = 1 ORDER BY scheduled_time ASC"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_reminder).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Option<Reminder>> {
        let row = sqlx::query("SELECT * FROM reminders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_reminder).transpose()
    }

    /// Active reminders scheduled at or before `now`, oldest first.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let rows = sqlx::query(
            "SELECT * FROM reminders
             WHERE is_active = 1 AND scheduled_time <= ?
             ORDER BY scheduled_time ASC",
        )
        .bind(to_db_time(now))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_reminder).collect()
    }

    /// Claim a reminder for processing. `None` while another holder has it.
    pub fn claim(&self, id: &str) -> Option<ClaimGuard> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(id.to_string()) {
            return None;
        }
        Some(ClaimGuard {
            id: id.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Flip `is_active` to false. Returns `false` if it was already inactive,
    /// so the transition happens at most once.
    pub(crate) async fn mark_notified(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let _write = self.write_lock.lock().await;
        let result = sqlx::query(
            "UPDATE reminders SET is_active = 0, notified_at = ?
             WHERE id = ? AND is_active = 1",
        )
        .bind(to_db_time(now))
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark reminder notified")?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn record_event(&self, event: &NotificationEvent) -> Result<()> {
        let _write = self.write_lock.lock().await;
        sqlx::query(
            "INSERT INTO notification_events (reminder_id, channel, attempted_at, success, error)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&event.reminder_id)
        .bind(&event.channel)
        .bind(to_db_time(event.attempted_at))
        .bind(event.success)
        .bind(event.error.as_deref())
        .execute(&self.pool)
        .await
        .context("Failed to record notification event")?;
        Ok(())
    }

    pub async fn events(&self, reminder_id: &str) -> Result<Vec<NotificationEvent>> {
        let rows = sqlx::query(
            "SELECT reminder_id, channel, attempted_at, success, error
             FROM notification_events WHERE reminder_id = ? ORDER BY id ASC",
        )
        .bind(reminder_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let attempted_at: String = row.get("attempted_at");
                Ok(NotificationEvent {
                    reminder_id: row.get("reminder_id"),
                    channel: row.get("channel"),
                    attempted_at: parse_db_time(&attempted_at)?,
                    success: row.get("success"),
                    error: row.get("error"),
                })
            })
            .collect()
    }

    /// Channels that already delivered this reminder.
    pub async fn succeeded_channels(&self, reminder_id: &str) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT channel FROM notification_events
             WHERE reminder_id = ? AND success = 1",
        )
        .bind(reminder_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("channel"))
            .collect())
    }

    /// Delete inactive reminders notified before `cutoff`, with their events.
    pub async fn compact(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let _write = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let cutoff = to_db_time(cutoff);

        sqlx::query(
            "DELETE FROM notification_events WHERE reminder_id IN (
                SELECT id FROM reminders
                WHERE is_active = 0 AND notified_at IS NOT NULL AND notified_at < ?
             )",
        )
        .bind(&cutoff)
        .execute(&mut *tx)
        .await
        .context("Failed to compact notification events")?;

        let removed = sqlx::query(
            "DELETE FROM reminders
             WHERE is_active = 0 AND notified_at IS NOT NULL AND notified_at < ?",
        )
        .bind(&cutoff)
        .execute(&mut *tx)
        .await
        .context("Failed to compact reminders")?
        .rows_affected();

        tx.commit().await?;
        if removed > 0 {
            tracing::info!(removed, "compacted reminders");
        }
        Ok(removed)
    }
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS reminders (
            id             TEXT PRIMARY KEY,
            message        TEXT NOT NULL,
            scheduled_time TEXT NOT NULL,
            priority       TEXT NOT NULL DEFAULT 'normal',
            created_at     TEXT NOT NULL,
            is_active      INTEGER NOT NULL DEFAULT 1,
            notified_at    TEXT
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create reminders table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(is_active, scheduled_time)",
    )
    .execute(pool)
    .await
    .context("Failed to create reminders index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS notification_events (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            reminder_id  TEXT NOT NULL,
            channel      TEXT NOT NULL,
            attempted_at TEXT NOT NULL,
            success      INTEGER NOT NULL,
            error        TEXT
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create notification_events table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notification_events_reminder
         ON notification_events(reminder_id, channel)",
    )
    .execute(pool)
    .await
    .context("Failed to create notification_events index")?;

    Ok(())
}

fn row_to_reminder(row: &SqliteRow) -> Result<Reminder> {
    let scheduled_raw: String = row.get("scheduled_time");
    let created_raw: String = row.get("created_at");
    let notified_raw: Option<String> = row.get("notified_at");
    let priority_raw: String = row.get("priority");

    Ok(Reminder {
        id: row.get("id"),
        message: row.get("message"),
        scheduled_time: parse_db_time(&scheduled_raw)?,
        priority: Priority::from_db(&priority_raw),
        created_at: parse_db_time(&created_raw)?,
        is_active: row.get("is_active"),
        notified_at: match notified_raw {
            Some(raw) => Some(parse_db_time(&raw)?),
            None => None,
        },
    })
}
