//! Drives one task through plan, risk check, confirmation, execution and
//! verification. Stages are reached only through bus requests.

use super::executor::ExecutionResult;
use super::messages::{
    PipelineBus, PipelineMessage, TOPIC_CONFIRMATION, TOPIC_EXECUTOR, TOPIC_RISK,
    TOPIC_TASK_CANCELLED, TOPIC_TELEMETRY, TOPIC_VERIFIER,
};
use super::plan::{ExecutionPlan, PlanStep};
use super::planner::{PlanOutcome, Planner, PlanningInput};
use super::task::{Task, TaskStatus, TraceEvent};
use crate::config::Config;
use crate::error::{BusError, ErrorKind, PipelineError, PlanError};
use crate::security::{ConfirmationDecision, ConfirmationRequest, ExecutionPermit, RiskAssessment};
use crate::telemetry::{Outcome, Stage, TelemetryEvent};
use crate::tools::ToolRegistry;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const SENDER: &str = "coordinator";
const RECENT_CONTEXT_LIMIT: usize = 5;
const CONTEXT_SUMMARY_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Bound on planner calls and stage requests.
    pub bus_timeout: Duration,
    /// Lifetime of a confirmation request.
    pub confirmation_timeout: Duration,
    /// Ceiling on a single tool invocation, enforced by the executor.
    /// The coordinator waits for the executor's result without a deadline.
    pub execution_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bus_timeout: config.bus_timeout(),
            confirmation_timeout: config.confirmation_timeout(),
            execution_timeout: config.execution_timeout(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            bus_timeout: Duration::from_secs(30),
            confirmation_timeout: Duration::from_secs(120),
            execution_timeout: Duration::from_secs(120),
        }
    }
}

struct TaskSlot {
    task: Task,
    cancel: CancellationToken,
    step_running: bool,
}

/// Why a run stopped early.
enum Abort {
    /// The task already ended elsewhere (cancellation).
    Finished,
    End {
        terminal: TaskStatus,
        kind: ErrorKind,
        message: String,
        step_id: Option<String>,
    },
}

impl Abort {
    fn failed(kind: ErrorKind, message: impl Into<String>, step_id: Option<&str>) -> Self {
        Self::End {
            terminal: TaskStatus::Failed,
            kind,
            message: message.into(),
            step_id: step_id.map(str::to_string),
        }
    }

    fn denied(kind: ErrorKind, message: impl Into<String>, step_id: Option<&str>) -> Self {
        Self::End {
            terminal: TaskStatus::Denied,
            kind,
            message: message.into(),
            step_id: step_id.map(str::to_string),
        }
    }

    fn bus(err: &BusError, step_id: Option<&str>) -> Self {
        Self::failed(err.kind(), err.to_string(), step_id)
    }

    fn unexpected(topic: &str, reply: &PipelineMessage, step_id: Option<&str>) -> Self {
        Self::bus(
            &BusError::UnexpectedReply {
                topic: topic.to_string(),
                detail: reply.label().to_string(),
            },
            step_id,
        )
    }
}

/// Owns every task record and runs tasks to a terminal state.
///
/// Different tasks may be driven concurrently; the task table lock is never
/// held across an await.
pub struct TaskCoordinator {
    bus: PipelineBus,
    planner: Arc<dyn Planner>,
    registry: Arc<ToolRegistry>,
    settings: PipelineSettings,
    tasks: Mutex<HashMap<Uuid, TaskSlot>>,
    recent: Mutex<VecDeque<String>>,
}

impl TaskCoordinator {
    pub fn new(
        bus: PipelineBus,
        planner: Arc<dyn Planner>,
        registry: Arc<ToolRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            bus,
            planner,
            registry,
            settings,
            tasks: Mutex::new(HashMap::new()),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    /// Register a new task in `planning`.
    pub fn create_task(&self, raw_request: impl Into<String>) -> Uuid {
        let task = Task::new(raw_request);
        let task_id = task.task_id();
        tracing::info!(task_id = %task_id, "task created");
        self.slots().insert(
            task_id,
            TaskSlot {
                task,
                cancel: CancellationToken::new(),
                step_running: false,
            },
        );
        task_id
    }

    /// Create a task and drive it to completion.
    pub async fn run(&self, raw_request: impl Into<String>) -> Result<Task, PipelineError> {
        let task_id = self.create_task(raw_request);
        self.drive(task_id).await
    }

    /// Run `task_id` to a terminal status and return the final snapshot.
    pub async fn drive(&self, task_id: Uuid) -> Result<Task, PipelineError> {
        let (cancel, raw_request) = {
            let slots = self.slots();
            let slot = slots
                .get(&task_id)
                .ok_or(PipelineError::TaskNotFound(task_id))?;
            (slot.cancel.clone(), slot.task.raw_request().to_string())
        };

        let started = Instant::now();
        if let Err(Abort::End {
            terminal,
            kind,
            message,
            step_id,
        }) = self.advance(task_id, &raw_request, &cancel).await
        {
            self.with_slot(task_id, |slot| {
                if slot.task.status().is_terminal() {
                    return;
                }
                if let Err(e) = slot
                    .task
                    .finish_with_error(terminal, kind, message, step_id)
                {
                    tracing::error!(task_id = %task_id, "could not end task: {e}");
                }
            });
        }

        let task = self.task(task_id).ok_or(PipelineError::TaskNotFound(task_id))?;
        let outcome = match task.status() {
            TaskStatus::Completed => Outcome::Ok,
            TaskStatus::Denied if task.error_kind() == Some(ErrorKind::Cancelled) => {
                Outcome::Cancelled
            }
            TaskStatus::Denied => Outcome::Denied,
            _ => Outcome::Failed,
        };
        self.emit(
            Stage::Task,
            task_id,
            started,
            outcome,
            task.error_kind().map(|kind| kind.to_string()),
        );
        self.remember(&task);
        Ok(task)
    }

    /// Cancel a task that has not started executing a step.
    pub fn cancel(&self, task_id: Uuid) -> Result<(), PipelineError> {
        {
            let mut slots = self.slots();
            let slot = slots
                .get_mut(&task_id)
                .ok_or(PipelineError::TaskNotFound(task_id))?;
            let status = slot.task.status();
            if !status.is_cancellable() || slot.step_running {
                return Err(PipelineError::NotCancellable {
                    task_id,
                    status: status.to_string(),
                });
            }
            slot.task.finish_with_error(
                TaskStatus::Denied,
                ErrorKind::Cancelled,
                "cancelled by user",
                None,
            )?;
            slot.cancel.cancel();
        }
        self.bus.publish(
            TOPIC_TASK_CANCELLED,
            SENDER,
            PipelineMessage::TaskCancelled { task_id },
        );
        Ok(())
    }

    /// Snapshot of one task.
    pub fn task(&self, task_id: Uuid) -> Option<Task> {
        self.slots().get(&task_id).map(|slot| slot.task.clone())
    }

    /// Snapshots of every task, oldest first.
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.slots().values().map(|slot| slot.task.clone()).collect();
        tasks.sort_by_key(Task::created_at);
        tasks
    }

    pub fn recent_context(&self) -> Vec<String> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    async fn advance(
        &self,
        task_id: Uuid,
        raw_request: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Abort> {
        let plan = self.plan(task_id, raw_request, cancel).await?;
        let assessments = self.assess(task_id, &plan, cancel).await?;

        let mut results: Vec<ExecutionResult> = Vec::with_capacity(plan.len());
        for (step, assessment) in plan.steps().iter().zip(&assessments) {
            let confirmation = if assessment.requires_confirmation() {
                Some(self.confirm(task_id, step, assessment, cancel).await?)
            } else {
                None
            };

            let permit = ExecutionPermit::grant(task_id, step, assessment, confirmation.as_ref())
                .map_err(|e| Abort::denied(e.kind(), e.to_string(), Some(&step.step_id)))?;

            let result = self.execute(task_id, step, permit).await?;
            let failed = !result.success;
            let (kind, message) = (
                result.error_kind.unwrap_or(ErrorKind::ToolExecutionError),
                result
                    .error
                    .clone()
                    .unwrap_or_else(|| "step failed".to_string()),
            );
            results.push(result);
            if failed {
                return Err(Abort::failed(kind, message, Some(&step.step_id)));
            }
        }

        self.verify(task_id, plan, results).await
    }

    async fn plan(
        &self,
        task_id: Uuid,
        raw_request: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionPlan, Abort> {
        let started = Instant::now();
        let input = PlanningInput {
            raw_request: raw_request.to_string(),
            available_tools: self.registry.specs(),
            recent_context: self.recent_context(),
        };

        let planned = cancellable(cancel, async {
            tokio::time::timeout(self.settings.bus_timeout, self.planner.plan(&input))
                .await
                .map_err(|_| {
                    Abort::bus(
                        &BusError::Timeout {
                            topic: format!("planner:{}", self.planner.name()),
                            timeout_ms: millis(self.settings.bus_timeout),
                        },
                        None,
                    )
                })
        })
        .await;

        let outcome = match planned {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => {
                let detail = Some(e.to_string());
                self.emit(Stage::Planning, task_id, started, Outcome::Failed, detail);
                return Err(Abort::failed(e.kind(), e.to_string(), None));
            }
            Ok(Err(abort)) | Err(abort) => {
                self.emit(Stage::Planning, task_id, started, Outcome::Failed, None);
                return Err(abort);
            }
        };

        let plan = match outcome {
            PlanOutcome::Plan(plan) => plan,
            PlanOutcome::CannotPlan { reason } => {
                let err = PlanError::CannotPlan(reason);
                let detail = Some(err.to_string());
                self.emit(Stage::Planning, task_id, started, Outcome::Failed, detail);
                return Err(Abort::failed(err.kind(), err.to_string(), None));
            }
        };

        if let Some(step) = plan
            .steps()
            .iter()
            .find(|step| !self.registry.contains(&step.tool_name))
        {
            let err = PlanError::UnknownTool {
                step_id: step.step_id.clone(),
                name: step.tool_name.clone(),
            };
            let detail = Some(err.to_string());
            self.emit(Stage::Planning, task_id, started, Outcome::Failed, detail);
            return Err(Abort::failed(
                err.kind(),
                err.to_string(),
                Some(&step.step_id),
            ));
        }

        self.emit(Stage::Planning, task_id, started, Outcome::Ok, None);
        self.update(task_id, |task| {
            task.set_plan(plan.clone());
            task.transition(TaskStatus::RiskCheck)
        })?;
        tracing::info!(task_id = %task_id, steps = plan.len(), "plan accepted");
        Ok(plan)
    }

    /// Classify every step before anything runs.
    async fn assess(
        &self,
        task_id: Uuid,
        plan: &ExecutionPlan,
        cancel: &CancellationToken,
    ) -> Result<Vec<RiskAssessment>, Abort> {
        let started = Instant::now();
        let mut assessments = Vec::with_capacity(plan.len());

        for step in plan.steps() {
            let step_id = Some(step.step_id.as_str());
            let reply = cancellable(
                cancel,
                self.bus.request(
                    TOPIC_RISK,
                    SENDER,
                    PipelineMessage::ClassifyStep { step: step.clone() },
                    self.settings.bus_timeout,
                ),
            )
            .await?
            .map_err(|e| Abort::bus(&e, step_id))?;

            let assessment = match reply.payload {
                PipelineMessage::Assessed(Ok(assessment)) => assessment,
                PipelineMessage::Assessed(Err(e)) => {
                    let detail = Some(e.to_string());
                    self.emit(Stage::RiskCheck, task_id, started, Outcome::Failed, detail);
                    return Err(Abort::failed(e.kind(), e.to_string(), step_id));
                }
                other => return Err(Abort::unexpected(TOPIC_RISK, &other, step_id)),
            };
            self.update(task_id, |task| {
                task.record(TraceEvent::Assessed {
                    assessment: assessment.clone(),
                });
                Ok(())
            })?;
            assessments.push(assessment);
        }

        if let Some(violation) = assessments.iter().find(|a| a.policy_violation()) {
            let message = format!(
                "step {} violates policy: {}",
                violation.step_id(),
                violation.rationale()
            );
            let detail = Some(message.clone());
            self.emit(Stage::RiskCheck, task_id, started, Outcome::Denied, detail);
            return Err(Abort::denied(
                ErrorKind::PolicyViolation,
                message,
                Some(violation.step_id()),
            ));
        }

        self.emit(Stage::RiskCheck, task_id, started, Outcome::Ok, None);
        Ok(assessments)
    }

    async fn confirm(
        &self,
        task_id: Uuid,
        step: &PlanStep,
        assessment: &RiskAssessment,
        cancel: &CancellationToken,
    ) -> Result<ConfirmationRequest, Abort> {
        let started = Instant::now();
        let step_id = Some(step.step_id.as_str());
        self.update(task_id, |task| task.transition(TaskStatus::AwaitingConfirmation))?;

        let timeout = self.settings.confirmation_timeout + self.settings.bus_timeout;
        let reply = cancellable(
            cancel,
            self.bus.request(
                TOPIC_CONFIRMATION,
                SENDER,
                PipelineMessage::ConfirmStep {
                    task_id,
                    step: step.clone(),
                    assessment: assessment.clone(),
                },
                timeout,
            ),
        )
        .await?
        .map_err(|e| Abort::bus(&e, step_id))?;

        let request = match reply.payload {
            PipelineMessage::ConfirmationResolved(Ok(request)) => request,
            PipelineMessage::ConfirmationResolved(Err(e)) => {
                let detail = Some(e.to_string());
                self.emit(Stage::Confirmation, task_id, started, Outcome::Failed, detail);
                return Err(Abort::denied(e.kind(), e.to_string(), step_id));
            }
            other => return Err(Abort::unexpected(TOPIC_CONFIRMATION, &other, step_id)),
        };

        self.update(task_id, |task| {
            task.record(TraceEvent::Confirmation {
                request: request.clone(),
            });
            Ok(())
        })?;
        let outcome = match request.decision() {
            ConfirmationDecision::Approved => Outcome::Ok,
            _ => Outcome::Denied,
        };
        self.emit(
            Stage::Confirmation,
            task_id,
            started,
            outcome,
            Some(request.decision().to_string()),
        );
        Ok(request)
    }

    /// Run one permitted step. Not cancellable once started, and not
    /// abandoned either: the executor always replies, so the result is
    /// recorded however long the tool takes.
    async fn execute(
        &self,
        task_id: Uuid,
        step: &PlanStep,
        permit: ExecutionPermit,
    ) -> Result<ExecutionResult, Abort> {
        let started = Instant::now();
        let step_id = Some(step.step_id.as_str());
        self.begin_step(task_id)?;

        let reply = self
            .bus
            .request_unbounded(
                TOPIC_EXECUTOR,
                SENDER,
                PipelineMessage::ExecuteStep {
                    task_id,
                    step: step.clone(),
                    permit,
                },
            )
            .await;
        self.with_slot(task_id, |slot| slot.step_running = false);

        let result = match reply.map_err(|e| Abort::bus(&e, step_id))?.payload {
            PipelineMessage::Executed(result) => result,
            other => return Err(Abort::unexpected(TOPIC_EXECUTOR, &other, step_id)),
        };

        self.update(task_id, |task| {
            task.record(TraceEvent::Executed {
                result: result.clone(),
            });
            Ok(())
        })?;
        let outcome = if result.success {
            Outcome::Ok
        } else {
            Outcome::Failed
        };
        self.emit(
            Stage::Execution,
            task_id,
            started,
            outcome,
            Some(format!("{}:{}", result.step_id, result.tool_name)),
        );
        Ok(result)
    }

    async fn verify(
        &self,
        task_id: Uuid,
        plan: ExecutionPlan,
        results: Vec<ExecutionResult>,
    ) -> Result<(), Abort> {
        let started = Instant::now();
        self.update(task_id, |task| task.transition(TaskStatus::Verifying))?;

        let reply = self
            .bus
            .request(
                TOPIC_VERIFIER,
                SENDER,
                PipelineMessage::Verify {
                    task_id,
                    plan,
                    results,
                },
                self.settings.bus_timeout,
            )
            .await
            .map_err(|e| Abort::bus(&e, None))?;

        let report = match reply.payload {
            PipelineMessage::Verified(report) => report,
            other => return Err(Abort::unexpected(TOPIC_VERIFIER, &other, None)),
        };

        let matches_intent = report.matches_intent;
        let anomalies = report.anomalies.join("; ");
        self.update(task_id, |task| {
            task.record(TraceEvent::Verified { report });
            Ok(())
        })?;

        if !matches_intent {
            let detail = Some(anomalies.clone());
            self.emit(Stage::Verification, task_id, started, Outcome::Failed, detail);
            return Err(Abort::failed(ErrorKind::VerificationMismatch, anomalies, None));
        }

        self.emit(Stage::Verification, task_id, started, Outcome::Ok, None);
        self.update(task_id, |task| task.transition(TaskStatus::Completed))?;
        tracing::info!(task_id = %task_id, "task completed");
        Ok(())
    }

    /// Atomically enter `executing` and mark a step as running, so `cancel`
    /// cannot interleave.
    fn begin_step(&self, task_id: Uuid) -> Result<(), Abort> {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&task_id) else {
            return Err(Abort::Finished);
        };
        if slot.task.status().is_terminal() || slot.cancel.is_cancelled() {
            return Err(Abort::Finished);
        }
        slot.task
            .transition(TaskStatus::Executing)
            .map_err(|e| Abort::failed(ErrorKind::PolicyViolation, e.to_string(), None))?;
        slot.step_running = true;
        Ok(())
    }

    /// Apply `f` to a live task. A task that already ended stops the run.
    fn update(
        &self,
        task_id: Uuid,
        f: impl FnOnce(&mut Task) -> Result<(), PipelineError>,
    ) -> Result<(), Abort> {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&task_id) else {
            return Err(Abort::Finished);
        };
        if slot.task.status().is_terminal() {
            return Err(Abort::Finished);
        }
        f(&mut slot.task)
            .map_err(|e| Abort::failed(ErrorKind::PolicyViolation, e.to_string(), None))
    }

    fn with_slot(&self, task_id: Uuid, f: impl FnOnce(&mut TaskSlot)) {
        if let Some(slot) = self.slots().get_mut(&task_id) {
            f(slot);
        }
    }

    fn emit(
        &self,
        stage: Stage,
        task_id: Uuid,
        started: Instant,
        outcome: Outcome,
        detail: Option<String>,
    ) {
        let mut event = TelemetryEvent::new(stage, Some(task_id), started.elapsed(), outcome);
        event.detail = detail;
        self.bus
            .publish(TOPIC_TELEMETRY, SENDER, PipelineMessage::Telemetry(event));
    }

    fn remember(&self, task: &Task) {
        let request: String = task.raw_request().chars().take(CONTEXT_SUMMARY_CHARS).collect();
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.push_back(format!("{}: {request}", task.status()));
        while recent.len() > RECENT_CONTEXT_LIMIT {
            recent.pop_front();
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Uuid, TaskSlot>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Race `fut` against cancellation of the task.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, Abort> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Abort::Finished),
        value = fut => Ok(value),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
