use crate::Config;
use crate::app::render::{
    render_reminders, render_status, render_task, render_telemetry, render_tools,
};
use crate::app::runtime::{RunOptions, start_pipeline};
use crate::cli::{Cli, Commands, ReminderCommands};
use crate::pipeline::TaskStatus;
use crate::reminders::{NewReminder, Priority, ReminderStore, parse_reminder_time};
use crate::security::PolicyTable;
use crate::telemetry::summarize;
use crate::tools::default_registry;
use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Run {
            request,
            plan,
            auto_deny,
        } => run_request(&config, &request, plan.as_deref(), auto_deny).await,
        Commands::Daemon => crate::daemon::run(Arc::new(config)).await,
        Commands::Reminders { reminder_command } => {
            handle_reminder_command(&config, reminder_command).await
        }
        Commands::Tools => {
            let store = Arc::new(ReminderStore::open_for_config(&config).await?);
            let registry = default_registry(&store);
            let table = PolicyTable::with_overrides(&config.policy.risk_overrides)?;
            print!("{}", render_tools(&registry.specs(), &table));
            Ok(())
        }
        Commands::Telemetry => {
            let summary = summarize(&config.telemetry_path())?;
            print!("{}", render_telemetry(&summary));
            Ok(())
        }
        Commands::Status => {
            print!("{}", render_status(&config));
            Ok(())
        }
    }
}

async fn run_request(
    config: &Config,
    request: &str,
    plan_file: Option<&Path>,
    auto_deny: bool,
) -> Result<()> {
    let pipeline = start_pipeline(
        config,
        &RunOptions {
            plan_file,
            auto_deny,
        },
    )
    .await?;

    let outcome = pipeline.coordinator().run(request).await;
    pipeline.shutdown().await;
    let task = outcome?;

    print!("{}", render_task(&task));
    if task.status() != TaskStatus::Completed {
        bail!("task {} ended {}", task.task_id(), task.status());
    }
    Ok(())
}

async fn handle_reminder_command(config: &Config, command: ReminderCommands) -> Result<()> {
    let store = ReminderStore::open_for_config(config).await?;
    match command {
        ReminderCommands::Add {
            message,
            time,
            priority,
        } => {
            let scheduled_time = parse_reminder_time(&time, Utc::now())?;
            let priority = match priority.as_deref() {
                Some(raw) => raw
                    .parse::<Priority>()
                    .map_err(|_| anyhow!("Unknown priority '{raw}' (use high, normal or low)"))?,
                None => Priority::default(),
            };
            let reminder = store
                .add(NewReminder::new(message, scheduled_time).with_priority(priority))
                .await?;
            println!(
                "✅ Reminder {} set for {}",
                reminder.id,
                reminder.scheduled_time.format("%Y-%m-%d %H:%M UTC")
            );
        }
        ReminderCommands::List { all } => {
            let reminders = store.list(all).await?;
            print!("{}", render_reminders(&reminders));
        }
        ReminderCommands::Compact { days } => {
            let days = days.unwrap_or(config.reminders.compact_after_days);
            let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
            let removed = store.compact(cutoff).await?;
            println!("Removed {removed} reminder(s) notified before {}", cutoff.format("%Y-%m-%d"));
        }
    }
    Ok(())
}
