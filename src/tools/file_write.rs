use super::common::{
    escapes_workspace, failed_tool_result, required_str, resolve_path, workspace_path_property,
};
use super::traits::{ExecutionContext, Tool};
use super::types::ToolResult;
use serde_json::json;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
enum WriteMode {
    Create,
    Overwrite,
    Append,
}

/// Write file contents with path sandboxing.
pub struct FileWriteTool;

impl FileWriteTool {
    pub const fn new() -> Self {
        Self
    }
}

impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write contents to a file in the workspace (create, overwrite or append)"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": workspace_path_property(),
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                },
                "mode": {
                    "type": "string",
                    "enum": ["create", "overwrite", "append"],
                    "description": "create fails if the file exists (default)"
                }
            },
            "required": ["path", "content"],
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
            let content = required_str(&args, "content")?;
            let mode: WriteMode = args
                .get("mode")
                .and_then(|v| v.as_str())
                .unwrap_or("create")
                .parse()
                .map_err(|_| anyhow::anyhow!("Unsupported write mode"))?;

            if let Err(reason) = ctx.sandbox.check_path(path) {
                return Ok(failed_tool_result(format!(
                    "blocked by security policy: {reason}"
                )));
            }

            let full_path = resolve_path(ctx, path);

            let Some(parent) = full_path.parent() else {
                return Ok(failed_tool_result("Invalid path: missing parent directory"));
            };

            match tokio::fs::metadata(parent).await {
                Ok(meta) => {
                    if !meta.is_dir() {
                        return Ok(failed_tool_result(format!(
                            "Invalid path: parent is not a directory: {}",
                            parent.display()
                        )));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tokio::fs::create_dir_all(parent).await?;
                }
                Err(e) => {
                    return Ok(failed_tool_result(format!(
                        "Failed to inspect parent directory: {e}"
                    )));
                }
            }

            // Resolve parent after creation so symlinked directories are caught.
            let resolved_parent = match tokio::fs::canonicalize(parent).await {
                Ok(p) => p,
                Err(e) => {
                    return Ok(failed_tool_result(format!(
                        "Failed to resolve file path: {e}"
                    )));
                }
            };

            let Some(file_name) = full_path.file_name() else {
                return Ok(failed_tool_result("Invalid path: missing file name"));
            };
            let resolved_target = resolved_parent.join(file_name);

            if !Path::new(path).is_absolute() && escapes_workspace(ctx, &resolved_parent).await {
                return Ok(failed_tool_result(
                    "blocked by security policy: resolved path escapes workspace",
                ));
            }

            if let Ok(meta) = tokio::fs::symlink_metadata(&resolved_target).await
                && meta.file_type().is_symlink()
            {
                return Ok(failed_tool_result(format!(
                    "Refusing to write through symlink: {}",
                    resolved_target.display()
                )));
            }

            let mut options = tokio::fs::OpenOptions::new();
            match mode {
                WriteMode::Create => options.write(true).create_new(true),
                WriteMode::Overwrite => options.write(true).create(true).truncate(true),
                WriteMode::Append => options.append(true).create(true),
            };

            let mut file = match options.open(&resolved_target).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Ok(failed_tool_result(format!(
                        "File already exists: {path} (use mode=overwrite or mode=append)"
                    )));
                }
                Err(e) => return Ok(failed_tool_result(format!("Failed to open file: {e}"))),
            };

            if let Err(e) = file.write_all(content.as_bytes()).await {
                return Ok(failed_tool_result(format!("Failed to write file: {e}")));
            }
            file.flush().await?;

            Ok(ToolResult::ok(
                format!("Written {} bytes to {path} ({mode})", content.len()),
                json!({
                    "path": resolved_target.to_string_lossy(),
                    "bytes_written": content.len(),
                    "mode": mode.to_string(),
                }),
            ))
        })
    }
}
