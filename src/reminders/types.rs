use crate::notifications::Notification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Unknown stored values fall back to `Normal`.
    pub(crate) fn from_db(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

/// A persisted reminder.
///
/// `is_active` and `notified_at` are written only by the daemon through
/// the store's conditional update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub message: String,
    pub scheduled_time: DateTime<Utc>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub notified_at: Option<DateTime<Utc>>,
}

impl Reminder {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.scheduled_time <= now
    }

    pub fn notification(&self) -> Notification {
        Notification {
            reminder_id: self.id.clone(),
            message: self.message.clone(),
            priority: self.priority.to_string(),
            scheduled_time: self.scheduled_time,
        }
    }
}

/// Input for [`super::ReminderStore::add`].
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub message: String,
    pub scheduled_time: DateTime<Utc>,
    pub priority: Priority,
}

impl NewReminder {
    pub fn new(message: impl Into<String>, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            scheduled_time,
            priority: Priority::default(),
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// One channel dispatch attempt for one reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub reminder_id: String,
    pub channel: String,
    pub attempted_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}
