use super::common::{failed_tool_result, required_str};
use super::traits::{ExecutionContext, Tool};
use super::types::ToolResult;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default execution time before the child is killed.
const SHELL_TIMEOUT_SECS: u64 = 60;
/// Upper bound a plan may request.
const MAX_TIMEOUT_SECS: u64 = 600;
/// Maximum captured size per stream (1 MB).
const MAX_OUTPUT_BYTES: usize = 1_048_576;
/// Environment variables passed through to commands.
/// Only functional variables, never credentials.
const SAFE_ENV_VARS: &[&str] = &[
    "PATH", "HOME", "TERM", "LANG", "LC_ALL", "LC_CTYPE", "USER", "SHELL",
];

/// Shell command execution in the workspace directory.
pub struct ShellTool;

impl ShellTool {
    pub const fn new() -> Self {
        Self
    }
}

fn truncate_stream(mut text: String, label: &str) -> String {
    if text.len() > MAX_OUTPUT_BYTES {
        text.truncate(text.floor_char_boundary(MAX_OUTPUT_BYTES));
        text.push_str(&format!("\n... [{label} truncated at 1MB]"));
    }
    text
}

impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace directory"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Kill the command after this many seconds (default 60)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(
        &'a self,
        args: serde_json::Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let command = required_str(&args, "command")?;
            let timeout_secs = args
                .get("timeout_secs")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(SHELL_TIMEOUT_SECS)
                .clamp(1, MAX_TIMEOUT_SECS);

            if let Err(reason) = ctx.sandbox.check_command(command) {
                return Ok(failed_tool_result(format!(
                    "blocked by security policy: {reason}"
                )));
            }

            // Scrubbed environment: only the safe variables are re-added.
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c")
                .arg(command)
                .current_dir(&ctx.workspace_dir)
                .env_clear()
                .kill_on_drop(true);

            for var in SAFE_ENV_VARS {
                if let Ok(val) = std::env::var(var) {
                    cmd.env(var, val);
                }
            }

            let controlled_tmp = ctx.workspace_dir.join(".taskwarden-tmp");
            if !controlled_tmp.exists() {
                tokio::fs::create_dir_all(&controlled_tmp).await?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    tokio::fs::set_permissions(
                        &controlled_tmp,
                        std::fs::Permissions::from_mode(0o700),
                    )
                    .await?;
                }
            }
            cmd.env("TMPDIR", &controlled_tmp);

            let result =
                tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await;

            match result {
                Ok(Ok(output)) => {
                    let stdout =
                        truncate_stream(String::from_utf8_lossy(&output.stdout).into_owned(), "output");
                    let stderr =
                        truncate_stream(String::from_utf8_lossy(&output.stderr).into_owned(), "stderr");
                    let exit_code = output.status.code();
                    let data = json!({
                        "command": command,
                        "exit_code": exit_code,
                        "stdout": stdout,
                        "stderr": stderr,
                    });

                    Ok(ToolResult {
                        success: output.status.success(),
                        output: stdout,
                        error: if output.status.success() {
                            None
                        } else if stderr.is_empty() {
                            Some(format!("command exited with {exit_code:?}"))
                        } else {
                            Some(stderr)
                        },
                        data: Some(data),
                    })
                }
                Ok(Err(e)) => Ok(failed_tool_result(format!("Failed to execute command: {e}"))),
                Err(_) => Ok(failed_tool_result(format!(
                    "Command timed out after {timeout_secs}s and was killed"
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::common::test_context;
    use tempfile::TempDir;

    #[test]
    fn shell_tool_name_matches_tool_kind() {
        assert_eq!(
            ShellTool::new().name(),
            crate::tools::ToolKind::ShellCommand.as_ref()
        );
    }

    #[test]
    fn shell_tool_schema_has_command() {
        let schema = ShellTool::new().parameters_schema();
        assert!(schema["properties"]["command"].is_object());
        assert!(
            schema["required"]
                .as_array()
                .unwrap()
                .contains(&json!("command"))
        );
    }

    #[tokio::test]
    async fn shell_executes_in_workspace() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("marker.txt"), "").unwrap();

        let result = ShellTool::new()
            .execute(json!({"command": "ls"}), &test_context(ws.path()))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("marker.txt"));
        let data = result.data.unwrap();
        assert_eq!(data["exit_code"], 0);
        assert_eq!(data["command"], "ls");
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure_with_data() {
        let ws = TempDir::new().unwrap();
        let result = ShellTool::new()
            .execute(json!({"command": "echo oops >&2; exit 3"}), &test_context(ws.path()))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref().map(str::trim), Some("oops"));
        assert_eq!(result.data.unwrap()["exit_code"], 3);
    }

    #[tokio::test]
    async fn environment_is_scrubbed() {
        let ws = TempDir::new().unwrap();
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("TASKWARDEN_TEST_SECRET_TOKEN", "hunter2") };

        let result = ShellTool::new()
            .execute(
                json!({"command": "echo \"[$TASKWARDEN_TEST_SECRET_TOKEN]\""}),
                &test_context(ws.path()),
            )
            .await
            .unwrap();

        unsafe { std::env::remove_var("TASKWARDEN_TEST_SECRET_TOKEN") };
        assert!(result.success);
        assert_eq!(result.output.trim(), "[]");
    }

    #[tokio::test]
    async fn blocked_command_is_refused() {
        let ws = TempDir::new().unwrap();
        let result = ShellTool::new()
            .execute(json!({"command": "sudo ls"}), &test_context(ws.path()))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("security policy"));
    }

    #[tokio::test]
    async fn timeout_kills_command() {
        let ws = TempDir::new().unwrap();
        let result = ShellTool::new()
            .execute(
                json!({"command": "sleep 5", "timeout_secs": 1}),
                &test_context(ws.path()),
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }
}
