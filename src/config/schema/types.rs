use super::{
    NotificationsConfig, ObservabilityConfig, PipelineConfig, PlannerConfig, PolicyConfig,
    RemindersConfig,
};
use crate::error::ConfigError;
use crate::security::RiskLevel;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub reminders: RemindersConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let taskwarden_dir = home.join(".taskwarden");

        Self {
            workspace_dir: taskwarden_dir.join("workspace"),
            config_path: taskwarden_dir.join("config.toml"),
            policy: PolicyConfig::default(),
            pipeline: PipelineConfig::default(),
            planner: PlannerConfig::default(),
            reminders: RemindersConfig::default(),
            notifications: NotificationsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Config rooted at an explicit workspace, used by tests and `--config`.
    pub fn for_workspace(workspace_dir: impl Into<PathBuf>) -> Self {
        let workspace_dir = workspace_dir.into();
        Self {
            config_path: workspace_dir.join("config.toml"),
            workspace_dir,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("pipeline.bus_timeout_secs", self.pipeline.bus_timeout_secs),
            (
                "pipeline.confirmation_timeout_secs",
                self.pipeline.confirmation_timeout_secs,
            ),
            (
                "pipeline.execution_timeout_secs",
                self.pipeline.execution_timeout_secs,
            ),
            ("reminders.poll_secs", self.reminders.poll_secs),
            (
                "reminders.dispatch_timeout_secs",
                self.reminders.dispatch_timeout_secs,
            ),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{field} must be > 0")));
            }
        }

        for (tool, level) in &self.policy.risk_overrides {
            if RiskLevel::from_str(level).is_err() {
                return Err(ConfigError::Validation(format!(
                    "policy.risk_overrides.{tool}: unknown risk level '{level}'"
                )));
            }
        }

        if let Some(url) = &self.notifications.webhook_url
            && url::Url::parse(url).is_err()
        {
            return Err(ConfigError::Validation(format!(
                "notifications.webhook_url is not a valid URL: {url}"
            )));
        }

        Ok(())
    }

    pub fn sandbox_root(&self) -> PathBuf {
        self.policy.resolve_sandbox_root(&self.workspace_dir)
    }

    pub fn reminder_db_path(&self) -> PathBuf {
        self.workspace_dir.join("reminders").join("reminders.db")
    }

    pub fn telemetry_path(&self) -> PathBuf {
        self.workspace_dir.join("telemetry.jsonl")
    }

    pub fn bus_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.bus_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.confirmation_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.execution_timeout_secs)
    }
}
