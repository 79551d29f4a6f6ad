//! Plain-text views printed by the CLI.

use crate::config::Config;
use crate::pipeline::{Task, TaskStatus, TraceEvent};
use crate::reminders::Reminder;
use crate::security::PolicyTable;
use crate::telemetry::TelemetrySummary;
use crate::tools::ToolSpec;
use console::style;
use std::fmt::Write;

pub fn render_task(task: &Task) -> String {
    let status = match task.status() {
        TaskStatus::Completed => style(task.status().to_string()).green().bold(),
        TaskStatus::Denied => style(task.status().to_string()).yellow().bold(),
        _ => style(task.status().to_string()).red().bold(),
    };

    let mut out = String::new();
    let _ = writeln!(out, "◆ Task {}  {status}", task.task_id());
    let _ = writeln!(out, "   Request: {}", task.raw_request());
    if let Some(plan) = task.plan() {
        let _ = writeln!(out, "   Plan:    {} step(s)", plan.len());
    }

    for event in task.execution_trace() {
        match event {
            TraceEvent::Assessed { assessment } => {
                let _ = writeln!(
                    out,
                    "   [{}] {} risk={}{}",
                    assessment.step_id(),
                    assessment.tool_name(),
                    assessment.level(),
                    if assessment.policy_violation() {
                        " (policy violation)"
                    } else {
                        ""
                    }
                );
            }
            TraceEvent::Confirmation { request } => {
                let _ = writeln!(
                    out,
                    "   [{}] confirmation {}",
                    request.step_id(),
                    request.decision()
                );
            }
            TraceEvent::Executed { result } => {
                let mark = if result.success {
                    style("ok").green()
                } else {
                    style("failed").red()
                };
                let _ = writeln!(
                    out,
                    "   [{}] {} {mark} ({}ms)",
                    result.step_id, result.tool_name, result.duration_ms
                );
                let detail = result.error.as_deref().unwrap_or(result.output.trim());
                for line in detail.lines().take(20) {
                    let _ = writeln!(out, "       {line}");
                }
            }
            TraceEvent::Verified { report } if !report.matches_intent => {
                for anomaly in &report.anomalies {
                    let _ = writeln!(out, "   ! {anomaly}");
                }
            }
            TraceEvent::Error { kind, message, .. } => {
                let _ = writeln!(out, "   {} {message}", style(kind.to_string()).red());
            }
            _ => {}
        }
    }
    out
}

pub fn render_tools(specs: &[ToolSpec], table: &PolicyTable) -> String {
    let mut out = String::new();
    for spec in specs {
        let level = table
            .level_for(&spec.name)
            .map_or_else(|| "unclassified".to_string(), |level| level.to_string());
        let _ = writeln!(out, "{}  [{level}]", style(&spec.name).cyan().bold());
        let _ = writeln!(out, "   {}", spec.description);
        let _ = writeln!(out, "   args: {}", spec.parameters);
    }
    out
}

pub fn render_reminders(reminders: &[Reminder]) -> String {
    if reminders.is_empty() {
        return "No reminders.\n".to_string();
    }
    let mut out = String::new();
    for reminder in reminders {
        let state = match reminder.notified_at {
            Some(at) => format!("notified {}", at.format("%Y-%m-%d %H:%M")),
            None if reminder.is_active => "active".to_string(),
            None => "inactive".to_string(),
        };
        let _ = writeln!(
            out,
            "{}  {}  [{}] {}  ({state})",
            reminder.id,
            reminder.scheduled_time.format("%Y-%m-%d %H:%M UTC"),
            reminder.priority,
            reminder.message
        );
    }
    out
}

pub fn render_telemetry(summary: &TelemetrySummary) -> String {
    if summary.stages.is_empty() {
        return "No telemetry recorded yet.\n".to_string();
    }
    let mut out = format!(
        "{:<14} {:>7} {:>10} {:>9}\n",
        "stage", "count", "avg ms", "success"
    );
    for (stage, stats) in &summary.stages {
        let _ = writeln!(
            out,
            "{:<14} {:>7} {:>10.1} {:>8.0}%",
            stage.to_string(),
            stats.count,
            stats.average_ms(),
            stats.success_rate() * 100.0
        );
    }
    if summary.malformed_lines > 0 {
        let _ = writeln!(out, "({} malformed line(s) skipped)", summary.malformed_lines);
    }
    out
}

pub fn render_status(config: &Config) -> String {
    let planner = config
        .planner
        .command
        .as_deref()
        .unwrap_or("(none; use --plan FILE)");
    let mut lines = vec![
        "◆ Taskwarden Status".to_string(),
        String::new(),
        format!("Version     {}", env!("CARGO_PKG_VERSION")),
        format!("Workspace   {}", config.workspace_dir.display()),
        format!("Config      {}", config.config_path.display()),
        String::new(),
        format!("  Planner        {planner}"),
        format!("  Approval       {:?}", config.pipeline.approval),
        format!("  Sandbox root   {}", config.sandbox_root().display()),
        format!("  Workspace only {}", config.policy.workspace_only),
        format!("  Telemetry      {}", config.observability.backend),
        String::new(),
        format!("  Reminder poll  {}s", config.reminders.poll_secs),
    ];

    let mut channels = Vec::new();
    if config.notifications.log {
        channels.push("log");
    }
    if config.notifications.desktop {
        channels.push("desktop");
    }
    if config
        .notifications
        .webhook_url
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty())
    {
        channels.push("webhook");
    }
    lines.push(format!(
        "  Channels       {}",
        if channels.is_empty() {
            "(none)".to_string()
        } else {
            channels.join(", ")
        }
    ));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
