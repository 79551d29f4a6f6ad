use super::executor::ExecutionResult;
use super::plan::{ExecutionPlan, PlanStep};
use crate::reminders::ReminderStore;
use crate::tools::{ToolKind, schema};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub task_id: Uuid,
    pub matches_intent: bool,
    pub anomalies: Vec<String>,
}

/// Checks executor results against what each step claimed to do.
///
/// Findings are returned as data; `verify` has no error path. Reminder
/// side effects are confirmed against the store when one is attached.
pub struct Verifier {
    workspace_dir: PathBuf,
    reminders: Option<Arc<ReminderStore>>,
}

impl Verifier {
    pub fn new(workspace_dir: PathBuf) -> Self {
        Self {
            workspace_dir,
            reminders: None,
        }
    }

    #[must_use]
    pub fn with_reminders(mut self, store: Arc<ReminderStore>) -> Self {
        self.reminders = Some(store);
        self
    }

    pub async fn verify(
        &self,
        task_id: Uuid,
        plan: &ExecutionPlan,
        results: &[ExecutionResult],
    ) -> VerificationReport {
        let mut anomalies = Vec::new();
        let planned: HashSet<&str> = plan.steps().iter().map(|s| s.step_id.as_str()).collect();

        for result in results {
            if !planned.contains(result.step_id.as_str()) {
                anomalies.push(format!(
                    "step {}: result does not belong to the plan",
                    result.step_id
                ));
            }
        }

        for step in plan.steps() {
            let Some(result) = results.iter().find(|r| r.step_id == step.step_id) else {
                anomalies.push(format!("step {}: no execution result", step.step_id));
                continue;
            };

            if result.tool_name != step.tool_name {
                anomalies.push(format!(
                    "step {}: executed {} but plan declared {}",
                    step.step_id, result.tool_name, step.tool_name
                ));
            }
            if !result.success {
                anomalies.push(format!(
                    "step {}: tool reported failure: {}",
                    step.step_id,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
                continue;
            }

            if let Ok(kind) = ToolKind::from_str(&step.tool_name) {
                self.check_shape(kind, step, result, &mut anomalies).await;
            }

            if let Some(expected) = &step.expected_output {
                let actual = result
                    .data
                    .clone()
                    .unwrap_or_else(|| Value::String(result.output.clone()));
                if let Err(reason) = schema::validate(expected, &actual) {
                    anomalies.push(format!(
                        "step {}: output does not match expectation: {reason}",
                        step.step_id
                    ));
                }
            }
        }

        let report = VerificationReport {
            task_id,
            matches_intent: anomalies.is_empty(),
            anomalies,
        };
        if !report.matches_intent {
            tracing::warn!(
                task_id = %task_id,
                anomalies = report.anomalies.len(),
                "verification found anomalies"
            );
        }
        report
    }

    async fn check_shape(
        &self,
        kind: ToolKind,
        step: &PlanStep,
        result: &ExecutionResult,
        anomalies: &mut Vec<String>,
    ) {
        let step_id = step.step_id.as_str();
        let data = result.data.as_ref();
        match kind {
            ToolKind::FileRead => {
                let content_missing =
                    data.is_none_or(|d| d.get("content").is_none_or(Value::is_null));
                let size = data
                    .and_then(|d| d.get("size_bytes"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                if content_missing && size > 0 {
                    anomalies.push(format!(
                        "step {step_id}: file_read returned no content for a {size}-byte file"
                    ));
                }
            }
            ToolKind::FileWrite | ToolKind::NoteCreate => {
                match data.and_then(|d| d.get("path")).and_then(Value::as_str) {
                    Some(path) if self.resolve(path).exists() => {}
                    Some(path) => anomalies.push(format!(
                        "step {step_id}: claimed path {path} does not exist"
                    )),
                    None => anomalies.push(format!(
                        "step {step_id}: {kind} result does not report a path"
                    )),
                }
            }
            ToolKind::ShellCommand => {
                if let Some(code) = data.and_then(|d| d.get("exit_code")).and_then(Value::as_i64)
                    && code != 0
                {
                    anomalies.push(format!(
                        "step {step_id}: command exited with status {code}"
                    ));
                }
            }
            ToolKind::ReminderSet => {
                match data.and_then(|d| d.get("reminder_id")).and_then(Value::as_str) {
                    Some(id) => self.check_reminder(step, id, anomalies).await,
                    None => anomalies.push(format!(
                        "step {step_id}: reminder_set did not return a reminder id"
                    )),
                }
            }
            ToolKind::NoteList | ToolKind::ReminderList => {}
        }
    }

    async fn check_reminder(&self, step: &PlanStep, id: &str, anomalies: &mut Vec<String>) {
        let step_id = step.step_id.as_str();
        let Some(store) = &self.reminders else {
            anomalies.push(format!(
                "step {step_id}: no reminder store to confirm reminder {id}"
            ));
            return;
        };

        let reminder = match store.get(id).await {
            Ok(Some(reminder)) => reminder,
            Ok(None) => {
                anomalies.push(format!("step {step_id}: reminder {id} is not in the store"));
                return;
            }
            Err(e) => {
                anomalies.push(format!("step {step_id}: could not read reminder {id}: {e:#}"));
                return;
            }
        };

        if !reminder.is_active && reminder.notified_at.is_none() {
            anomalies.push(format!(
                "step {step_id}: reminder {id} is inactive and was never notified"
            ));
        }
        if let Some(message) = step.arguments.get("message").and_then(Value::as_str)
            && message.trim() != reminder.message
        {
            anomalies.push(format!(
                "step {step_id}: stored reminder {id} has a different message"
            ));
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_dir.join(path)
        }
    }
}
