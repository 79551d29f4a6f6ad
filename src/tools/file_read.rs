use super::common::{
    escapes_workspace, failed_tool_result, required_str, resolve_path, workspace_path_property,
};
use super::traits::{ExecutionContext, Tool};
use super::types::ToolResult;
use serde_json::json;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// Files above this size are refused rather than loaded.
const MAX_READ_BYTES: u64 = 1_048_576;

/// Read a UTF-8 text file.
pub struct FileReadTool;

impl FileReadTool {
    pub const fn new() -> Self {
        Self
    }
}

impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a text file from the workspace"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": workspace_path_property()
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(
        &'a self,
        args: serde_json::Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let path = required_str(&args, "path")?;

            if let Err(reason) = ctx.sandbox.check_path(path) {
                return Ok(failed_tool_result(format!(
                    "blocked by security policy: {reason}"
                )));
            }

            let full_path = resolve_path(ctx, path);
            let resolved = match tokio::fs::canonicalize(&full_path).await {
                Ok(p) => p,
                Err(e) => {
                    return Ok(failed_tool_result(format!(
                        "Failed to resolve {}: {e}",
                        full_path.display()
                    )));
                }
            };

            if !Path::new(path).is_absolute() && escapes_workspace(ctx, &resolved).await {
                return Ok(failed_tool_result(
                    "blocked by security policy: resolved path escapes workspace",
                ));
            }

            let meta = tokio::fs::metadata(&resolved).await?;
            if !meta.is_file() {
                return Ok(failed_tool_result(format!("Not a regular file: {path}")));
            }
            if meta.len() > MAX_READ_BYTES {
                return Ok(failed_tool_result(format!(
                    "File too large: {} bytes (limit {MAX_READ_BYTES})",
                    meta.len()
                )));
            }

            let bytes = tokio::fs::read(&resolved).await?;
            let size_bytes = bytes.len();
            let content = String::from_utf8(bytes).ok();
            let output = match &content {
                Some(text) => text.clone(),
                None => format!("{path}: {size_bytes} bytes of non-UTF-8 data"),
            };

            Ok(ToolResult::ok(
                output,
                json!({
                    "path": resolved.to_string_lossy(),
                    "content": content,
                    "size_bytes": size_bytes,
                }),
            ))
        })
    }
}
