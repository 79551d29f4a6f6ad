use clap::Subcommand;
use serde::{Deserialize, Serialize};

/// Reminder subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReminderCommands {
    /// Schedule a reminder
    Add {
        /// What to be reminded of
        message: String,
        /// When: `15m`, `1h30m`, `in 2h`, `2026-05-01 09:00`, `09:00` or RFC 3339 (UTC)
        time: String,
        /// high, normal or low
        #[arg(short, long)]
        priority: Option<String>,
    },
    /// List reminders
    List {
        /// Include reminders that already fired
        #[arg(short, long)]
        all: bool,
    },
    /// Remove fired reminders older than the configured retention
    Compact {
        /// Override the retention in days
        #[arg(long)]
        days: Option<u32>,
    },
}
