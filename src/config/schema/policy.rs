use crate::security::defaults::{default_blocked_commands, default_forbidden_paths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Root that absolute tool paths must stay inside. Defaults to the workspace.
    #[serde(default)]
    pub sandbox_root: Option<String>,
    #[serde(default = "default_workspace_only")]
    pub workspace_only: bool,
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,
    #[serde(default = "default_blocked_commands")]
    pub blocked_commands: Vec<String>,
    /// Per-tool risk tier overrides, e.g. `note_create = "low"`.
    #[serde(default)]
    pub risk_overrides: BTreeMap<String, String>,
}

fn default_workspace_only() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            sandbox_root: None,
            workspace_only: default_workspace_only(),
            forbidden_paths: default_forbidden_paths(),
            blocked_commands: default_blocked_commands(),
            risk_overrides: BTreeMap::new(),
        }
    }
}

impl PolicyConfig {
    pub fn resolve_sandbox_root(&self, workspace_dir: &Path) -> PathBuf {
        self.sandbox_root
            .as_deref()
            .map_or_else(
                || workspace_dir.to_path_buf(),
                |raw| PathBuf::from(shellexpand::tilde(raw).into_owned()),
            )
    }
}
