use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Prompt on the terminal.
    #[default]
    Cli,
    /// Deny every HIGH-risk step without asking.
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_bus_timeout_secs")]
    pub bus_timeout_secs: u64,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    #[serde(default)]
    pub approval: ApprovalMode,
}

fn default_bus_timeout_secs() -> u64 {
    30
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_execution_timeout_secs() -> u64 {
    120
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bus_timeout_secs: default_bus_timeout_secs(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            execution_timeout_secs: default_execution_timeout_secs(),
            approval: ApprovalMode::default(),
        }
    }
}

/// External reasoning command that turns a request into a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}
