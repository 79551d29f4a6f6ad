//! Reminder persistence and the background daemon that fires them.

pub mod daemon;
pub mod store;
pub mod time;
pub mod types;

pub use daemon::{ReminderDaemon, TickReport};
pub use store::{ClaimGuard, ReminderStore};
pub use time::parse_reminder_time;
pub use types::{NewReminder, NotificationEvent, Priority, Reminder};
