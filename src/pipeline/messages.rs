//! Bus topics and the message type carried between pipeline stages.

use super::executor::ExecutionResult;
use super::plan::{ExecutionPlan, PlanStep};
use super::verifier::VerificationReport;
use crate::bus::MessageBus;
use crate::error::{ConfirmationError, SecurityError};
use crate::security::{ConfirmationRequest, ExecutionPermit, RiskAssessment};
use crate::telemetry::TelemetryEvent;
use uuid::Uuid;

pub const TOPIC_RISK: &str = "risk.classify";
pub const TOPIC_CONFIRMATION: &str = "confirmation.request";
pub const TOPIC_CONFIRMATION_PENDING: &str = "confirmation.pending";
pub const TOPIC_EXECUTOR: &str = "executor.execute";
pub const TOPIC_VERIFIER: &str = "verifier.verify";
pub const TOPIC_TASK_CANCELLED: &str = "task.cancelled";
pub const TOPIC_TELEMETRY: &str = "telemetry";

#[derive(Debug, Clone)]
pub enum PipelineMessage {
    ClassifyStep {
        step: PlanStep,
    },
    Assessed(Result<RiskAssessment, SecurityError>),
    ConfirmStep {
        task_id: Uuid,
        step: PlanStep,
        assessment: RiskAssessment,
    },
    ConfirmationPending(ConfirmationRequest),
    ConfirmationResolved(Result<ConfirmationRequest, ConfirmationError>),
    ExecuteStep {
        task_id: Uuid,
        step: PlanStep,
        permit: ExecutionPermit,
    },
    Executed(ExecutionResult),
    Verify {
        task_id: Uuid,
        plan: ExecutionPlan,
        results: Vec<ExecutionResult>,
    },
    Verified(VerificationReport),
    TaskCancelled {
        task_id: Uuid,
    },
    Telemetry(TelemetryEvent),
}

impl PipelineMessage {
    /// Variant name for log lines and unexpected-reply errors.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ClassifyStep { .. } => "classify_step",
            Self::Assessed(_) => "assessed",
            Self::ConfirmStep { .. } => "confirm_step",
            Self::ConfirmationPending(_) => "confirmation_pending",
            Self::ConfirmationResolved(_) => "confirmation_resolved",
            Self::ExecuteStep { .. } => "execute_step",
            Self::Executed(_) => "executed",
            Self::Verify { .. } => "verify",
            Self::Verified(_) => "verified",
            Self::TaskCancelled { .. } => "task_cancelled",
            Self::Telemetry(_) => "telemetry",
        }
    }
}

pub type PipelineBus = MessageBus<PipelineMessage>;
