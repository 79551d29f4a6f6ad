use super::plan::ExecutionPlan;
use crate::error::PlanError;
use crate::tools::ToolSpec;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// What the reasoning collaborator gets to see.
#[derive(Debug, Clone, Serialize)]
pub struct PlanningInput {
    pub raw_request: String,
    pub available_tools: Vec<ToolSpec>,
    /// One-line summaries of recently finished tasks, oldest first.
    pub recent_context: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Plan(ExecutionPlan),
    CannotPlan { reason: String },
}

/// Turns a request into a plan. Implementations are external collaborators;
/// the coordinator validates whatever they return.
pub trait Planner: Send + Sync {
    fn name(&self) -> &str;

    fn plan<'a>(
        &'a self,
        input: &'a PlanningInput,
    ) -> Pin<Box<dyn Future<Output = Result<PlanOutcome, PlanError>> + Send + 'a>>;
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CannotPlanReply {
    cannot_plan: String,
}

/// Interpret planner output: either `{"cannot_plan": "<reason>"}` or a plan.
pub fn parse_planner_output(text: &str) -> Result<PlanOutcome, PlanError> {
    if let Ok(reply) = serde_json::from_str::<CannotPlanReply>(text) {
        return Ok(PlanOutcome::CannotPlan {
            reason: reply.cannot_plan,
        });
    }
    ExecutionPlan::parse(text).map(PlanOutcome::Plan)
}

/// Returns the same plan JSON for every request (tests, `--plan FILE`).
pub struct StaticPlanner {
    raw: String,
}

impl StaticPlanner {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file {}", path.display()))?;
        Ok(Self::new(raw))
    }
}

impl Planner for StaticPlanner {
    fn name(&self) -> &str {
        "static"
    }

    fn plan<'a>(
        &'a self,
        _input: &'a PlanningInput,
    ) -> Pin<Box<dyn Future<Output = Result<PlanOutcome, PlanError>> + Send + 'a>> {
        Box::pin(async move { parse_planner_output(&self.raw) })
    }
}

/// Runs an external reasoning command: planning input as JSON on stdin,
/// plan JSON expected on stdout.
pub struct CommandPlanner {
    command: String,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl CommandPlanner {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        working_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir,
            timeout,
        }
    }

    async fn invoke(&self, input: &PlanningInput) -> Result<String, PlanError> {
        let payload = serde_json::to_vec(input)
            .map_err(|e| PlanError::Planner(format!("encode planning input: {e}")))?;

        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlanError::Planner(format!("spawn {}: {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                // The exit status below explains a planner that quit early.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(PlanError::Planner(format!("write planner stdin: {e}"))),
            }
            // Dropping stdin closes the pipe so the planner sees EOF.
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                PlanError::Planner(format!(
                    "planner timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| PlanError::Planner(format!("wait for planner: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlanError::Planner(format!(
                "planner exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| PlanError::Schema("planner output is not UTF-8".into()))
    }
}

impl Planner for CommandPlanner {
    fn name(&self) -> &str {
        &self.command
    }

    fn plan<'a>(
        &'a self,
        input: &'a PlanningInput,
    ) -> Pin<Box<dyn Future<Output = Result<PlanOutcome, PlanError>> + Send + 'a>> {
        Box::pin(async move {
            let stdout = self.invoke(input).await?;
            tracing::debug!(planner = %self.command, bytes = stdout.len(), "planner replied");
            parse_planner_output(&stdout)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn input() -> PlanningInput {
        PlanningInput {
            raw_request: "show me the readme".into(),
            available_tools: Vec::new(),
            recent_context: Vec::new(),
        }
    }

    #[tokio::test]
    async fn static_planner_returns_plan() {
        let planner =
            StaticPlanner::new(r#"[{"tool": "file_read", "args": {"path": "README.md"}}]"#);
        let PlanOutcome::Plan(plan) = planner.plan(&input()).await.unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.steps()[0].tool_name, "file_read");
    }

    #[tokio::test]
    async fn cannot_plan_reply_is_recognized() {
        let planner = StaticPlanner::new(r#"{"cannot_plan": "no tool can book flights"}"#);
        assert_eq!(
            planner.plan(&input()).await.unwrap(),
            PlanOutcome::CannotPlan {
                reason: "no tool can book flights".into()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_planner_reads_stdin_and_parses_stdout() {
        let ws = TempDir::new().unwrap();
        // Plans only when the request mentions the readme.
        let script = r#"read -r input; case "$input" in *readme*) echo '[{"tool":"note_list"}]';; *) echo '{"cannot_plan":"no"}';; esac"#;
        let planner = CommandPlanner::new(
            "sh",
            vec!["-c".into(), script.into()],
            ws.path().to_path_buf(),
            Duration::from_secs(5),
        );

        let PlanOutcome::Plan(plan) = planner.plan(&input()).await.unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.steps()[0].tool_name, "note_list");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_planner_failures_are_planner_errors() {
        let ws = TempDir::new().unwrap();
        let failing = CommandPlanner::new(
            "sh",
            vec!["-c".into(), "echo broken >&2; exit 2".into()],
            ws.path().to_path_buf(),
            Duration::from_secs(5),
        );
        let err = failing.plan(&input()).await.unwrap_err();
        assert!(matches!(err, PlanError::Planner(ref msg) if msg.contains("broken")));

        let slow = CommandPlanner::new(
            "sh",
            vec!["-c".into(), "sleep 5".into()],
            ws.path().to_path_buf(),
            Duration::from_millis(100),
        );
        let err = slow.plan(&input()).await.unwrap_err();
        assert!(matches!(err, PlanError::Planner(ref msg) if msg.contains("timed out")));
    }
}
