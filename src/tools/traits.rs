use super::types::{ToolResult, ToolSpec};
use crate::security::SandboxPolicy;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

/// Per-invocation environment handed to every tool.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workspace_dir: PathBuf,
    pub sandbox: Arc<SandboxPolicy>,
}

impl ExecutionContext {
    pub fn new(workspace_dir: PathBuf, sandbox: Arc<SandboxPolicy>) -> Self {
        Self {
            workspace_dir,
            sandbox,
        }
    }

    /// Context whose sandbox root is the workspace itself.
    pub fn for_workspace(workspace_dir: PathBuf) -> Self {
        let sandbox = Arc::new(SandboxPolicy::with_root(workspace_dir.clone()));
        Self::new(workspace_dir, sandbox)
    }
}

/// A capability the executor can dispatch a plan step to.
pub trait Tool: Send + Sync {
    /// Registry key; must match a policy table entry to be plannable.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for arguments, checked before `execute` is called.
    fn parameters_schema(&self) -> serde_json::Value;

    fn execute<'a>(
        &'a self,
        args: serde_json::Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}
