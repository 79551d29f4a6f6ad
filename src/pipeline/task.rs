use super::executor::ExecutionResult;
use super::plan::ExecutionPlan;
use super::verifier::VerificationReport;
use crate::error::{ErrorKind, PipelineError};
use crate::security::{ConfirmationRequest, RiskAssessment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Planning,
    RiskCheck,
    AwaitingConfirmation,
    Executing,
    Verifying,
    Completed,
    Failed,
    Denied,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Denied)
    }

    /// Cancellation is allowed only before a step starts executing.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            Self::Planning | Self::RiskCheck | Self::AwaitingConfirmation
        )
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use TaskStatus::{
            AwaitingConfirmation, Completed, Denied, Executing, Failed, Planning, RiskCheck,
            Verifying,
        };
        matches!(
            (self, next),
            (Planning, RiskCheck | Failed | Denied)
                | (RiskCheck, AwaitingConfirmation | Executing | Failed | Denied)
                | (AwaitingConfirmation, Executing | Failed | Denied)
                | (Executing, AwaitingConfirmation | Verifying | Failed)
                | (Verifying, Completed | Failed)
        )
    }
}

/// Audit trail entry. The trace is append-only.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    StatusChanged {
        from: TaskStatus,
        to: TaskStatus,
        at: DateTime<Utc>,
    },
    Planned {
        steps: usize,
        at: DateTime<Utc>,
    },
    Assessed {
        assessment: RiskAssessment,
    },
    Confirmation {
        request: ConfirmationRequest,
    },
    Executed {
        result: ExecutionResult,
    },
    Verified {
        report: VerificationReport,
    },
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        at: DateTime<Utc>,
    },
}

/// One request's lifecycle record. Owned by the coordinator; callers get
/// snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    task_id: Uuid,
    raw_request: String,
    created_at: DateTime<Utc>,
    status: TaskStatus,
    plan: Option<ExecutionPlan>,
    execution_trace: Vec<TraceEvent>,
    finished_at: Option<DateTime<Utc>>,
    error_kind: Option<ErrorKind>,
}

impl Task {
    pub(crate) fn new(raw_request: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            raw_request: raw_request.into(),
            created_at: Utc::now(),
            status: TaskStatus::Planning,
            plan: None,
            execution_trace: Vec::new(),
            finished_at: None,
            error_kind: None,
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn raw_request(&self) -> &str {
        &self.raw_request
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn plan(&self) -> Option<&ExecutionPlan> {
        self.plan.as_ref()
    }

    pub fn execution_trace(&self) -> &[TraceEvent] {
        &self.execution_trace
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Kind of the error that ended the task, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn results(&self) -> Vec<&ExecutionResult> {
        self.execution_trace
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Executed { result } => Some(result),
                _ => None,
            })
            .collect()
    }

    pub fn assessments(&self) -> Vec<&RiskAssessment> {
        self.execution_trace
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Assessed { assessment } => Some(assessment),
                _ => None,
            })
            .collect()
    }

    pub fn confirmations(&self) -> Vec<&ConfirmationRequest> {
        self.execution_trace
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Confirmation { request } => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn verification(&self) -> Option<&VerificationReport> {
        self.execution_trace.iter().find_map(|event| match event {
            TraceEvent::Verified { report } => Some(report),
            _ => None,
        })
    }

    /// Error messages recorded on the trace, oldest first.
    pub fn errors(&self) -> Vec<(ErrorKind, &str)> {
        self.execution_trace
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Error { kind, message, .. } => Some((*kind, message.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Move to `next`. A transition to the current status is a no-op.
    pub(crate) fn transition(&mut self, next: TaskStatus) -> Result<(), PipelineError> {
        if self.status == next && !next.is_terminal() {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::IllegalTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        let now = Utc::now();
        self.execution_trace.push(TraceEvent::StatusChanged {
            from: self.status,
            to: next,
            at: now,
        });
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        tracing::debug!(task_id = %self.task_id, status = %next, "task status changed");
        Ok(())
    }

    pub(crate) fn set_plan(&mut self, plan: ExecutionPlan) {
        if self.status.is_terminal() || self.plan.is_some() {
            return;
        }
        self.execution_trace.push(TraceEvent::Planned {
            steps: plan.len(),
            at: Utc::now(),
        });
        self.plan = Some(plan);
    }

    /// Append to the trace. Terminal tasks are immutable, so late events
    /// are dropped.
    pub(crate) fn record(&mut self, event: TraceEvent) {
        if self.status.is_terminal() {
            tracing::debug!(task_id = %self.task_id, "dropping trace event for finished task");
            return;
        }
        self.execution_trace.push(event);
    }

    /// Record the error and end the task in `terminal`.
    pub(crate) fn finish_with_error(
        &mut self,
        terminal: TaskStatus,
        kind: ErrorKind,
        message: impl Into<String>,
        step_id: Option<String>,
    ) -> Result<(), PipelineError> {
        let message = message.into();
        self.record(TraceEvent::Error {
            kind,
            message: message.clone(),
            step_id,
            at: Utc::now(),
        });
        self.transition(terminal)?;
        self.error_kind = Some(kind);
        tracing::info!(
            task_id = %self.task_id,
            status = %terminal,
            kind = %kind,
            "task ended: {message}"
        );
        Ok(())
    }
}
