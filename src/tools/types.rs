use crate::security::RiskLevel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of tool capabilities the core knows how to gate.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolKind {
    FileRead,
    FileWrite,
    ShellCommand,
    NoteCreate,
    NoteList,
    ReminderSet,
    ReminderList,
}

impl ToolKind {
    pub fn default_risk(self) -> RiskLevel {
        match self {
            Self::ShellCommand => RiskLevel::High,
            Self::FileWrite | Self::NoteCreate | Self::ReminderSet => RiskLevel::Medium,
            Self::FileRead | Self::NoteList | Self::ReminderList => RiskLevel::Low,
        }
    }
}

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    /// Human-readable summary.
    pub output: String,
    pub error: Option<String>,
    /// Structured payload the verifier inspects.
    #[serde(default)]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            data: Some(data),
        }
    }
}

/// Description of a tool for planners and the CLI listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}
