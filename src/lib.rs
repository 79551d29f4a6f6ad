#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod app;
pub mod bus;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod notifications;
pub mod pipeline;
pub mod reminders;
pub mod security;
pub mod telemetry;
pub mod tools;

pub use cli::{Cli, Commands, ReminderCommands};
pub use config::Config;
pub use error::{ErrorKind, TaskwardenError};
