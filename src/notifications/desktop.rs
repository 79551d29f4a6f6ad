use super::traits::{Notification, NotificationChannel};
use anyhow::Context;
use std::future::Future;
use std::pin::Pin;

const APP_TITLE: &str = "Taskwarden";

/// Native desktop notification: `osascript` on macOS, `notify-send` elsewhere.
pub struct DesktopNotifier;

/// Escape a string for embedding inside an AppleScript string literal.
fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

impl NotificationChannel for DesktopNotifier {
    fn name(&self) -> &str {
        "desktop"
    }

    fn send<'a>(
        &'a self,
        notification: &'a Notification,
        _target: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut cmd = if cfg!(target_os = "macos") {
                let script = format!(
                    r#"display notification "{}" with title "{APP_TITLE}""#,
                    escape_applescript(&notification.message)
                );
                let mut cmd = tokio::process::Command::new("osascript");
                cmd.arg("-e").arg(script);
                cmd
            } else {
                let urgency = match notification.priority.as_str() {
                    "high" => "critical",
                    "low" => "low",
                    _ => "normal",
                };
                let mut cmd = tokio::process::Command::new("notify-send");
                cmd.arg("--urgency")
                    .arg(urgency)
                    .arg(APP_TITLE)
                    .arg(&notification.message);
                cmd
            };

            let output = cmd
                .kill_on_drop(true)
                .output()
                .await
                .context("spawn desktop notifier")?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                anyhow::bail!("desktop notification failed: {}", stderr.trim());
            }
            Ok(())
        })
    }
}
