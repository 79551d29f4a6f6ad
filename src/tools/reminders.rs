use super::common::{failed_tool_result, required_str};
use super::traits::{ExecutionContext, Tool};
use super::types::ToolResult;
use crate::reminders::{NewReminder, Priority, ReminderStore, parse_reminder_time};
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Schedule a reminder through the shared store.
pub struct ReminderSetTool {
    store: Arc<ReminderStore>,
}

impl ReminderSetTool {
    pub fn new(store: Arc<ReminderStore>) -> Self {
        Self { store }
    }
}

impl Tool for ReminderSetTool {
    fn name(&self) -> &str {
        "reminder_set"
    }

    fn description(&self) -> &str {
        "Schedule a reminder (e.g. time=\"in 2h\", \"18:30\", \"2026-05-01 09:00\")"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "What to remind about"},
                "time": {
                    "type": "string",
                    "description": "Relative (90s, 15m, 1h30m, in 2h), RFC 3339, YYYY-MM-DD HH:MM or HH:MM (UTC)"
                },
                "priority": {"type": "string", "enum": ["high", "normal", "low"]}
            },
            "required": ["message", "time"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        _ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let message = required_str(&args, "message")?;
            let time = required_str(&args, "time")?;
            let priority = args
                .get("priority")
                .and_then(Value::as_str)
                .map(|raw| raw.parse::<Priority>())
                .transpose()
                .map_err(|_| anyhow::anyhow!("Unsupported priority"))?
                .unwrap_or_default();

            let scheduled_time = match parse_reminder_time(time, chrono::Utc::now()) {
                Ok(when) => when,
                Err(e) => return Ok(failed_tool_result(e.to_string())),
            };

            let reminder = match self
                .store
                .add(NewReminder::new(message, scheduled_time).with_priority(priority))
                .await
            {
                Ok(reminder) => reminder,
                Err(e) => return Ok(failed_tool_result(format!("{e:#}"))),
            };

            Ok(ToolResult::ok(
                format!(
                    "Reminder set for {}: {}",
                    reminder.scheduled_time.to_rfc3339(),
                    reminder.message
                ),
                json!({
                    "reminder_id": reminder.id,
                    "scheduled_time": reminder.scheduled_time.to_rfc3339(),
                    "priority": reminder.priority,
                }),
            ))
        })
    }
}

/// List reminders from the shared store.
pub struct ReminderListTool {
    store: Arc<ReminderStore>,
}

impl ReminderListTool {
    pub fn new(store: Arc<ReminderStore>) -> Self {
        Self { store }
    }
}

impl Tool for ReminderListTool {
    fn name(&self) -> &str {
        "reminder_list"
    }

    fn description(&self) -> &str {
        "List scheduled reminders"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "include_inactive": {
                    "type": "boolean",
                    "description": "Also list reminders that already fired"
                }
            },
            "additionalProperties": false
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        _ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let include_inactive = args
                .get("include_inactive")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let reminders = self.store.list(include_inactive).await?;

            let output = if reminders.is_empty() {
                "No reminders scheduled.".to_string()
            } else {
                reminders
                    .iter()
                    .map(|r| {
                        let state = if r.is_active { "pending" } else { "done" };
                        format!(
                            "- [{state}] {} at {} ({})",
                            r.message,
                            r.scheduled_time.to_rfc3339(),
                            r.priority
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            };

            Ok(ToolResult::ok(
                output,
                json!({"count": reminders.len(), "reminders": reminders}),
            ))
        })
    }
}
