//! Builds a running pipeline from configuration.

use crate::config::{ApprovalMode, Config};
use crate::pipeline::{
    CommandPlanner, Pipeline, PipelineComponents, PipelineSettings, Planner, StaticPlanner,
};
use crate::reminders::ReminderStore;
use crate::security::{
    ApprovalBroker, AutoDenyBroker, CliApprovalBroker, RiskEngine, SandboxPolicy,
};
use crate::telemetry::create_observer;
use crate::tools::{ExecutionContext, default_registry};
use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;

/// How the `run` command was invoked.
#[derive(Debug, Clone, Default)]
pub struct RunOptions<'a> {
    pub plan_file: Option<&'a Path>,
    pub auto_deny: bool,
}

pub async fn start_pipeline(config: &Config, options: &RunOptions<'_>) -> Result<Pipeline> {
    tokio::fs::create_dir_all(&config.workspace_dir)
        .await
        .with_context(|| format!("Failed to create workspace {}", config.workspace_dir.display()))?;

    let store = Arc::new(ReminderStore::open_for_config(config).await?);
    let registry = Arc::new(default_registry(&store));
    let risk = RiskEngine::from_config(&config.policy, &config.workspace_dir)?;
    let sandbox = Arc::new(SandboxPolicy::from_config(
        &config.policy,
        &config.workspace_dir,
    ));

    Ok(Pipeline::start(PipelineComponents {
        registry,
        planner: build_planner(config, options.plan_file)?,
        risk,
        broker: build_broker(config, options.auto_deny),
        context: ExecutionContext::new(config.workspace_dir.clone(), sandbox),
        settings: PipelineSettings::from_config(config),
        observer: create_observer(&config.observability, &config.telemetry_path()),
        reminders: Some(store),
    }))
}

fn build_planner(config: &Config, plan_file: Option<&Path>) -> Result<Arc<dyn Planner>> {
    if let Some(path) = plan_file {
        return Ok(Arc::new(StaticPlanner::from_file(path)?));
    }
    match config.planner.command.as_deref().map(str::trim) {
        Some(command) if !command.is_empty() => Ok(Arc::new(CommandPlanner::new(
            command,
            config.planner.args.clone(),
            config.workspace_dir.clone(),
            config.bus_timeout(),
        ))),
        _ => bail!("No planner configured: set [planner].command in config.toml or pass --plan FILE"),
    }
}

fn build_broker(config: &Config, auto_deny: bool) -> Arc<dyn ApprovalBroker> {
    if auto_deny || config.pipeline.approval == ApprovalMode::Deny {
        Arc::new(AutoDenyBroker::non_interactive())
    } else {
        Arc::new(CliApprovalBroker::new())
    }
}
