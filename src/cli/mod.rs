use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod subcommands;

pub use subcommands::ReminderCommands;

/// `Taskwarden` - local-first task automation with risk-gated tools.
#[derive(Parser, Debug)]
#[command(name = "taskwarden")]
#[command(version)]
#[command(about = "Turn requests into audited, risk-gated tool runs.", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this config file instead of ~/.taskwarden/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one request through plan, risk check, confirmation, execution and verification
    Run {
        /// The request, in plain words
        request: String,

        /// Read the plan JSON from this file instead of calling the planner
        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,

        /// Deny every confirmation without prompting
        #[arg(long)]
        auto_deny: bool,
    },

    /// Run the reminder daemon until Ctrl-C
    Daemon,

    /// Manage reminders
    Reminders {
        #[command(subcommand)]
        reminder_command: ReminderCommands,
    },

    /// List tools with their risk tier and argument schema
    Tools,

    /// Summarize recorded telemetry per stage
    Telemetry,

    /// Show configuration status
    Status,
}
