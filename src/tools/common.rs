use super::traits::ExecutionContext;
use super::types::ToolResult;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

pub(crate) fn workspace_path_property() -> Value {
    json!({
        "type": "string",
        "description": "Path to the file, relative to the workspace"
    })
}

pub(crate) fn failed_tool_result(message: impl Into<String>) -> ToolResult {
    ToolResult {
        success: false,
        output: String::new(),
        error: Some(message.into()),
        data: None,
    }
}

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing '{key}' parameter"))
}

/// Relative paths resolve against the workspace; absolute paths are kept.
pub(crate) fn resolve_path(ctx: &ExecutionContext, raw: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).into_owned());
    if expanded.is_absolute() {
        expanded
    } else {
        ctx.workspace_dir.join(expanded)
    }
}

/// True when a canonical path lies outside the canonical workspace
/// (e.g. through a symlink).
pub(crate) async fn escapes_workspace(ctx: &ExecutionContext, resolved: &Path) -> bool {
    let root = tokio::fs::canonicalize(&ctx.workspace_dir)
        .await
        .unwrap_or_else(|_| ctx.workspace_dir.clone());
    !resolved.starts_with(root)
}

#[cfg(test)]
pub(crate) fn test_context(workspace: &Path) -> ExecutionContext {
    ExecutionContext::for_workspace(workspace.to_path_buf())
}
