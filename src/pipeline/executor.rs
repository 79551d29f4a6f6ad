use super::plan::PlanStep;
use crate::error::{ErrorKind, ToolError};
use crate::security::ExecutionPermit;
use crate::tools::{ExecutionContext, ToolRegistry, schema};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

/// Outcome of one executed step. Produced once and never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub step_id: String,
    pub tool_name: String,
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub(crate) fn failed(step: &PlanStep, kind: ErrorKind, message: String, started: Instant) -> Self {
        Self {
            step_id: step.step_id.clone(),
            tool_name: step.tool_name.clone(),
            success: false,
            output: String::new(),
            data: None,
            error_kind: Some(kind),
            error: Some(message),
            duration_ms: elapsed_ms(started),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Sole caller of tool implementations.
pub struct Executor {
    registry: Arc<ToolRegistry>,
    ctx: ExecutionContext,
    step_timeout: Duration,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ExecutionContext) -> Self {
        Self {
            registry,
            ctx,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Ceiling on one tool invocation. A tool still running at the deadline
    /// is dropped and the step fails with `ToolExecutionError`.
    #[must_use]
    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Run one step. Never returns an error: every failure, including a
    /// tool's own error, is normalized into an unsuccessful result.
    pub async fn execute(
        &self,
        task_id: Uuid,
        step: &PlanStep,
        permit: &ExecutionPermit,
    ) -> ExecutionResult {
        let started = Instant::now();

        if let Err(err) = permit.check(task_id, step) {
            tracing::warn!(task_id = %task_id, step_id = %step.step_id, "execution refused: {err}");
            return ExecutionResult::failed(step, err.kind(), err.to_string(), started);
        }

        let Some(tool) = self.registry.get(&step.tool_name) else {
            let err = ToolError::NotFound {
                name: step.tool_name.clone(),
            };
            return ExecutionResult::failed(step, err.kind(), err.to_string(), started);
        };

        let args = step.arguments_value();
        if let Err(reason) = schema::validate(&tool.parameters_schema(), &args) {
            let err = ToolError::InvalidArguments {
                name: step.tool_name.clone(),
                reason,
            };
            tracing::info!(step_id = %step.step_id, tool = %step.tool_name, "{err}");
            return ExecutionResult::failed(step, err.kind(), err.to_string(), started);
        }

        tracing::debug!(
            step_id = %step.step_id,
            tool = %step.tool_name,
            level = %permit.level(),
            "executing step"
        );
        let outcome = tokio::time::timeout(self.step_timeout, tool.execute(args, &self.ctx))
            .await
            .unwrap_or_else(|_| {
                Err(anyhow::anyhow!(
                    "timed out after {}ms",
                    self.step_timeout.as_millis()
                ))
            });

        let result = match outcome {
            Ok(tool_result) if tool_result.success => ExecutionResult {
                step_id: step.step_id.clone(),
                tool_name: step.tool_name.clone(),
                success: true,
                output: tool_result.output,
                data: tool_result.data,
                error_kind: None,
                error: None,
                duration_ms: elapsed_ms(started),
            },
            Ok(tool_result) => {
                let err = ToolError::Execution {
                    name: step.tool_name.clone(),
                    message: tool_result
                        .error
                        .unwrap_or_else(|| "tool reported failure".to_string()),
                };
                ExecutionResult {
                    output: tool_result.output,
                    data: tool_result.data,
                    ..ExecutionResult::failed(step, err.kind(), err.to_string(), started)
                }
            }
            Err(e) => {
                let err = ToolError::Execution {
                    name: step.tool_name.clone(),
                    message: format!("{e:#}"),
                };
                ExecutionResult::failed(step, err.kind(), err.to_string(), started)
            }
        };

        tracing::info!(
            step_id = %result.step_id,
            tool = %result.tool_name,
            success = result.success,
            duration_ms = result.duration_ms,
            "step executed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{ConfirmationGate, PolicyTable, RiskEngine, SandboxPolicy, Verdict};
    use crate::tools::{ShellTool, Tool, ToolResult};
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct ScriptedTool {
        calls: Arc<AtomicUsize>,
        behaviour: &'static str,
    }

    impl Tool for ScriptedTool {
        fn name(&self) -> &str {
            "note_list"
        }

        fn description(&self) -> &str {
            "scripted note listing"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"limit": {"type": "integer"}},
                "additionalProperties": false
            })
        }

        fn execute<'a>(
            &'a self,
            _args: Value,
            _ctx: &'a ExecutionContext,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                match self.behaviour {
                    "error" => anyhow::bail!("disk on fire"),
                    "slow" => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(ToolResult::ok("too late", json!({})))
                    }
                    "fail" => Ok(ToolResult {
                        success: false,
                        output: "partial".into(),
                        error: Some("nope".into()),
                        data: None,
                    }),
                    _ => Ok(ToolResult::ok("done", json!({"count": 0}))),
                }
            })
        }
    }

    fn setup(behaviour: &'static str) -> (Executor, Arc<AtomicUsize>, TempDir) {
        let ws = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ScriptedTool {
            calls: Arc::clone(&calls),
            behaviour,
        }));
        let executor = Executor::new(
            Arc::new(registry),
            ExecutionContext::for_workspace(ws.path().to_path_buf()),
        );
        (executor, calls, ws)
    }

    fn permit_for(task_id: Uuid, step: &PlanStep) -> ExecutionPermit {
        let engine = RiskEngine::new(PolicyTable::builtin(), SandboxPolicy::default());
        ExecutionPermit::grant(task_id, step, &engine.classify(step).unwrap(), None).unwrap()
    }

    #[tokio::test]
    async fn successful_step_carries_data() {
        let (executor, calls, _ws) = setup("ok");
        let task = Uuid::new_v4();
        let step = PlanStep::new("1", "note_list", json!({}));

        let result = executor.execute(task, &step, &permit_for(task, &step)).await;
        assert!(result.success);
        assert_eq!(result.data, Some(json!({"count": 0})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn schema_mismatch_never_reaches_tool() {
        let (executor, calls, _ws) = setup("ok");
        let task = Uuid::new_v4();
        let step = PlanStep::new("1", "note_list", json!({"limit": "ten"}));

        let result = executor.execute(task, &step, &permit_for(task, &step)).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidArguments));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tool_errors_are_normalized() {
        let task = Uuid::new_v4();
        let (executor, _calls, _ws) = setup("error");
        let step = PlanStep::new("1", "note_list", json!({}));
        let result = executor.execute(task, &step, &permit_for(task, &step)).await;
        assert_eq!(result.error_kind, Some(ErrorKind::ToolExecutionError));
        assert!(result.error.unwrap().contains("disk on fire"));

        let (executor, _calls, _ws) = setup("fail");
        let result = executor.execute(task, &step, &permit_for(task, &step)).await;
        assert!(!result.success);
        assert_eq!(result.output, "partial");
        assert_eq!(result.error_kind, Some(ErrorKind::ToolExecutionError));
    }

    #[tokio::test]
    async fn step_timeout_bounds_the_tool() {
        let (executor, calls, _ws) = setup("slow");
        let executor = executor.with_step_timeout(Duration::from_millis(50));
        let task = Uuid::new_v4();
        let step = PlanStep::new("1", "note_list", json!({}));

        let result = executor.execute(task, &step, &permit_for(task, &step)).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::ToolExecutionError));
        assert!(result.error.unwrap().contains("timed out"));
        assert!(result.duration_ms < 5_000);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permit_for_another_step_is_refused() {
        let (executor, calls, _ws) = setup("ok");
        let task = Uuid::new_v4();
        let first = PlanStep::new("1", "note_list", json!({}));
        let second = PlanStep::new("2", "note_list", json!({}));

        let result = executor.execute(task, &second, &permit_for(task, &first)).await;
        assert_eq!(result.error_kind, Some(ErrorKind::PolicyViolation));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn permit_is_not_reusable_across_tasks_or_arguments() {
        let (executor, calls, _ws) = setup("ok");
        let task = Uuid::new_v4();
        let step = PlanStep::new("1", "note_list", json!({}));
        let permit = permit_for(task, &step);

        let result = executor.execute(Uuid::new_v4(), &step, &permit).await;
        assert_eq!(result.error_kind, Some(ErrorKind::PolicyViolation));

        let widened = PlanStep::new("1", "note_list", json!({"limit": 500}));
        let result = executor.execute(task, &widened, &permit).await;
        assert_eq!(result.error_kind, Some(ErrorKind::PolicyViolation));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn approved_command_cannot_be_swapped_for_another() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("keep.txt"), "precious").unwrap();
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ShellTool::new()));
        let executor = Executor::new(
            Arc::new(registry),
            ExecutionContext::for_workspace(ws.path().to_path_buf()),
        );

        let task = Uuid::new_v4();
        let engine = RiskEngine::new(PolicyTable::builtin(), SandboxPolicy::with_root(ws.path()));
        let listed = PlanStep::new("1", "shell_command", json!({"command": "ls"}));
        let assessment = engine.classify(&listed).unwrap();
        let gate = ConfirmationGate::new();
        let request = gate
            .open(task, &listed, &assessment, Duration::from_secs(60))
            .unwrap();
        let approval = gate
            .decide(request.confirmation_id(), Verdict::Approve)
            .unwrap();
        let permit = ExecutionPermit::grant(task, &listed, &assessment, Some(&approval)).unwrap();

        let swapped = PlanStep::new("1", "shell_command", json!({"command": "rm keep.txt"}));
        let result = executor.execute(task, &swapped, &permit).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::PolicyViolation));
        assert!(ws.path().join("keep.txt").exists());

        let result = executor.execute(task, &listed, &permit).await;
        assert!(result.success);
        assert!(result.output.contains("keep.txt"));
    }
}
