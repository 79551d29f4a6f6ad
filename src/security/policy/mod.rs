mod command;
mod path;

pub use command::{CommandSegment, parse_command};
pub use path::is_temp_path;

use super::defaults::{default_blocked_commands, default_forbidden_paths};
use crate::config::PolicyConfig;
use std::path::{Path, PathBuf};

/// Static argument rules: where tool paths may point and which programs
/// `shell_command` may never run.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    pub sandbox_root: PathBuf,
    pub workspace_only: bool,
    pub forbidden_paths: Vec<String>,
    pub blocked_commands: Vec<String>,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            sandbox_root: PathBuf::from("."),
            workspace_only: true,
            forbidden_paths: default_forbidden_paths(),
            blocked_commands: default_blocked_commands(),
        }
    }
}

impl SandboxPolicy {
    pub fn from_config(policy: &PolicyConfig, workspace_dir: &Path) -> Self {
        Self {
            sandbox_root: policy.resolve_sandbox_root(workspace_dir),
            workspace_only: policy.workspace_only,
            forbidden_paths: policy.forbidden_paths.clone(),
            blocked_commands: policy.blocked_commands.clone(),
        }
    }

    pub fn with_root(sandbox_root: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
            ..Self::default()
        }
    }
}
