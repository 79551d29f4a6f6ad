use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ─── Error kinds surfaced in the audit trail ─────────────────────────────────

/// Closed set of failure categories recorded on tasks and reports.
///
/// Every subsystem error maps onto exactly one kind via its `kind()` method,
/// so the execution trace can carry the category verbatim.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum ErrorKind {
    UnknownTool,
    PlanSchemaError,
    InvalidArguments,
    PolicyViolation,
    ConfirmationDenied,
    ConfirmationExpired,
    ToolExecutionError,
    VerificationMismatch,
    NotificationDispatchError,
    BusTimeout,
    Cancelled,
}

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for Taskwarden.
///
/// Library callers match on these to decide recovery; internal plumbing
/// (store, config loading, CLI) keeps using `anyhow::Result`.
#[derive(Debug, Error)]
pub enum TaskwardenError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Message bus ─────────────────────────────────────────────────────
    #[error("bus: {0}")]
    Bus(#[from] BusError),

    // ── Planning / coordination ─────────────────────────────────────────
    #[error("plan: {0}")]
    Plan(#[from] PlanError),

    #[error("pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    // ── Tools ───────────────────────────────────────────────────────────
    #[error("tool: {0}")]
    Tool(#[from] ToolError),

    // ── Security / Policy ───────────────────────────────────────────────
    #[error("security: {0}")]
    Security(#[from] SecurityError),

    #[error("confirmation: {0}")]
    Confirmation(#[from] ConfirmationError),

    // ── Reminders / Notifications ───────────────────────────────────────
    #[error("reminder: {0}")]
    Reminder(#[from] ReminderError),

    #[error("notification: {0}")]
    Notification(#[from] NotificationError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Bus errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("request on '{topic}' timed out after {timeout_ms}ms")]
    Timeout { topic: String, timeout_ms: u64 },

    #[error("no responder subscribed to '{topic}'")]
    NoResponder { topic: String },

    #[error("unexpected reply on '{topic}': {detail}")]
    UnexpectedReply { topic: String, detail: String },

    #[error("bus is shut down")]
    Closed,
}

impl BusError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BusTimeout
    }
}

// ─── Plan errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("malformed plan: {0}")]
    Schema(String),

    #[error("planner cannot plan: {0}")]
    CannotPlan(String),

    #[error("planner failed: {0}")]
    Planner(String),

    #[error("plan references unknown tool '{name}' in step {step_id}")]
    UnknownTool { step_id: String, name: String },
}

impl PlanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTool { .. } => ErrorKind::UnknownTool,
            Self::Schema(_) | Self::CannotPlan(_) | Self::Planner(_) => ErrorKind::PlanSchemaError,
        }
    }
}

// ─── Pipeline errors ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("task {0} not found")]
    TaskNotFound(Uuid),

    #[error("task {task_id} cannot be cancelled while {status}")]
    NotCancellable { task_id: Uuid, status: String },

    #[error("illegal task transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },
}

// ─── Tool errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool {name} not found")]
    NotFound { name: String },

    #[error("invalid arguments for {name}: {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("tool {name} execution failed: {message}")]
    Execution { name: String, message: String },
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::UnknownTool,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::Execution { .. } => ErrorKind::ToolExecutionError,
        }
    }
}

// ─── Security errors ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("step {step_id} violates policy: {reason}")]
    PolicyViolation { step_id: String, reason: String },

    #[error("step {step_id} is HIGH risk and has no approved confirmation")]
    ConfirmationRequired { step_id: String },

    #[error("step {step_id} was denied: {reason}")]
    ConfirmationDenied { step_id: String, reason: String },

    #[error("confirmation for step {step_id} expired")]
    ConfirmationExpired { step_id: String },

    #[error("permit does not cover step {step_id}: {reason}")]
    PermitMismatch { step_id: String, reason: String },
}

impl SecurityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTool { .. } => ErrorKind::UnknownTool,
            Self::PolicyViolation { .. }
            | Self::ConfirmationRequired { .. }
            | Self::PermitMismatch { .. } => ErrorKind::PolicyViolation,
            Self::ConfirmationDenied { .. } => ErrorKind::ConfirmationDenied,
            Self::ConfirmationExpired { .. } => ErrorKind::ConfirmationExpired,
        }
    }
}

// ─── Confirmation gate errors ────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("confirmation {0} not found")]
    NotFound(Uuid),

    #[error("confirmation {id} already resolved as {decision}")]
    AlreadyResolved { id: Uuid, decision: String },

    #[error("confirmation {0} expired")]
    Expired(Uuid),

    #[error("step {step_id} does not require confirmation")]
    NotRequired { step_id: String },
}

impl ConfirmationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Expired(_) => ErrorKind::ConfirmationExpired,
            Self::NotFound(_) | Self::AlreadyResolved { .. } | Self::NotRequired { .. } => {
                ErrorKind::PolicyViolation
            }
        }
    }
}

// ─── Reminder errors ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReminderError {
    #[error("could not parse reminder time '{0}'")]
    InvalidTime(String),

    #[error("reminder time {0} is not in the future")]
    NotInFuture(String),

    #[error("reminder {0} not found")]
    NotFound(String),
}

// ─── Notification errors ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("channel {channel} dispatch failed: {message}")]
    Dispatch { channel: String, message: String },

    #[error("channel {channel} timed out after {timeout_secs}s")]
    Timeout { channel: String, timeout_secs: u64 },
}

impl NotificationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::NotificationDispatchError
    }
}

// ─── Convenience re-exports ──────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, TaskwardenError>;
