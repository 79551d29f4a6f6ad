pub mod cli;
pub mod gate;
pub mod permit;

pub use cli::CliApprovalBroker;
pub use gate::{ConfirmationDecision, ConfirmationGate, ConfirmationRequest, Verdict};
pub use permit::ExecutionPermit;

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied { reason: String },
}

impl From<ApprovalDecision> for Verdict {
    fn from(decision: ApprovalDecision) -> Self {
        match decision {
            ApprovalDecision::Approved => Verdict::Approve,
            ApprovalDecision::Denied { reason } => Verdict::Deny { reason },
        }
    }
}

/// Source of human decisions for pending confirmations.
pub trait ApprovalBroker: Send + Sync {
    fn request_approval<'a>(
        &'a self,
        request: &'a ConfirmationRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ApprovalDecision>> + Send + 'a>>;
}

/// Denies everything; used when nobody is around to answer.
pub struct AutoDenyBroker {
    pub reason: String,
}

impl AutoDenyBroker {
    pub fn non_interactive() -> Self {
        Self {
            reason: "non-interactive session".to_string(),
        }
    }
}

impl ApprovalBroker for AutoDenyBroker {
    fn request_approval<'a>(
        &'a self,
        _request: &'a ConfirmationRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ApprovalDecision>> + Send + 'a>> {
        Box::pin(async move {
            Ok(ApprovalDecision::Denied {
                reason: self.reason.clone(),
            })
        })
    }
}

/// One-line description of a step for approval prompts.
#[must_use]
pub fn summarize_args(tool_name: &str, args: &serde_json::Map<String, Value>) -> String {
    let text = |key: &str| args.get(key).and_then(Value::as_str).unwrap_or("?");
    match tool_name {
        "shell_command" => text("command").to_string(),
        "file_write" => {
            let len = args
                .get("content")
                .and_then(Value::as_str)
                .map_or(0, str::len);
            let mode = args.get("mode").and_then(Value::as_str).unwrap_or("create");
            format!("{mode} {len} bytes at {}", text("path"))
        }
        "file_read" => text("path").to_string(),
        "reminder_set" => format!("'{}' at {}", text("message"), text("time")),
        _ => serde_json::to_string(args).unwrap_or_default(),
    }
}
