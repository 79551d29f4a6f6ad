use super::types::{PolicyTable, RiskAssessment, RiskLevel};
use crate::config::PolicyConfig;
use crate::error::{ConfigError, SecurityError};
use crate::pipeline::PlanStep;
use crate::security::defaults::{
    DESTRUCTIVE_COMMANDS, GIT_NETWORK_SUBCOMMANDS, NETWORK_COMMANDS, NETWORK_SCHEMES,
};
use crate::security::policy::{SandboxPolicy, is_temp_path, parse_command};
use crate::tools::ToolKind;
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;

/// Argument keys that name a remote endpoint for any tool.
const NETWORK_ARGUMENT_KEYS: &[&str] = &["url", "uri", "endpoint", "webhook", "host"];

/// Pure step classifier: policy table plus argument overrides plus the
/// sandbox policy list. Holds no mutable state, so it is shared freely.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    table: PolicyTable,
    sandbox: SandboxPolicy,
}

#[derive(Default)]
struct Findings {
    level: Option<RiskLevel>,
    reasons: Vec<String>,
    violations: Vec<String>,
    rules: Vec<String>,
}

impl Findings {
    fn force_high(&mut self, rule: &str, reason: String) {
        self.level = Some(RiskLevel::High);
        self.rules.push(rule.to_string());
        self.reasons.push(reason);
    }

    fn violation(&mut self, rule: &str, reason: String) {
        self.rules.push(rule.to_string());
        self.violations.push(reason);
    }
}

impl RiskEngine {
    pub fn new(table: PolicyTable, sandbox: SandboxPolicy) -> Self {
        Self { table, sandbox }
    }

    pub fn from_config(policy: &PolicyConfig, workspace_dir: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(
            PolicyTable::with_overrides(&policy.risk_overrides)?,
            SandboxPolicy::from_config(policy, workspace_dir),
        ))
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    pub fn sandbox(&self) -> &SandboxPolicy {
        &self.sandbox
    }

    /// Classify one step. Unknown tools are rejected rather than guessed.
    pub fn classify(&self, step: &PlanStep) -> Result<RiskAssessment, SecurityError> {
        let base = self
            .table
            .level_for(&step.tool_name)
            .ok_or_else(|| SecurityError::UnknownTool {
                name: step.tool_name.clone(),
            })?;

        let mut findings = Findings::default();
        findings.rules.push(format!("table:{}={base}", step.tool_name));

        match ToolKind::from_str(&step.tool_name) {
            Ok(ToolKind::FileRead) => self.inspect_path_argument(step, &mut findings),
            Ok(ToolKind::FileWrite) => {
                self.inspect_path_argument(step, &mut findings);
                inspect_write_mode(step, &mut findings);
            }
            Ok(ToolKind::ShellCommand) => self.inspect_shell(step, &mut findings),
            _ => {}
        }
        inspect_network_arguments(step, &mut findings);

        let level = findings.level.map_or(base, |forced| forced.max(base));
        let policy_violation = !findings.violations.is_empty();

        let mut rationale = format!("{} is {base} in the policy table", step.tool_name);
        for reason in &findings.reasons {
            rationale.push_str("; ");
            rationale.push_str(reason);
        }
        for violation in &findings.violations {
            rationale.push_str("; policy violation: ");
            rationale.push_str(violation);
        }

        Ok(RiskAssessment::new(
            step,
            level,
            rationale,
            policy_violation,
            findings.rules,
        ))
    }

    fn inspect_path_argument(&self, step: &PlanStep, findings: &mut Findings) {
        let Some(path) = step.arguments.get("path").and_then(Value::as_str) else {
            return;
        };
        if let Err(reason) = self.sandbox.check_path(path) {
            findings.violation("policy:path", reason);
        }
    }

    fn inspect_shell(&self, step: &PlanStep, findings: &mut Findings) {
        let Some(command) = step.arguments.get("command").and_then(Value::as_str) else {
            return;
        };

        if let Err(reason) = self.sandbox.check_command(command) {
            findings.violation("policy:command", reason);
        }

        for segment in parse_command(command) {
            let program = segment.program.as_str();
            if DESTRUCTIVE_COMMANDS.contains(&program) {
                findings.force_high(
                    "override:destructive",
                    format!("destructive command `{program}`"),
                );
            }
            if NETWORK_COMMANDS.contains(&program) {
                findings.force_high("override:network", format!("network command `{program}`"));
            }
            if program == "git"
                && let Some(sub) = segment.args.first()
                && GIT_NETWORK_SUBCOMMANDS.contains(&sub.as_str())
            {
                findings.force_high("override:network", format!("remote git operation `git {sub}`"));
            }
            if let Some(target) = segment.redirect_targets.first()
                && !is_temp_path(target)
            {
                findings.force_high(
                    "override:overwrite",
                    format!("output redirection overwrites `{target}`"),
                );
            }
            if let Some(url) = segment.args.iter().find(|arg| is_network_url(arg)) {
                findings.force_high("override:network", format!("outbound request to {url}"));
            }
        }
    }
}

fn inspect_write_mode(step: &PlanStep, findings: &mut Findings) {
    let mode = step
        .arguments
        .get("mode")
        .and_then(Value::as_str)
        .unwrap_or("create");
    if mode != "overwrite" {
        return;
    }
    let path = step
        .arguments
        .get("path")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !is_temp_path(path) {
        findings.force_high(
            "override:overwrite",
            format!("overwrites non-temporary file `{path}`"),
        );
    }
}

fn inspect_network_arguments(step: &PlanStep, findings: &mut Findings) {
    for (key, value) in &step.arguments {
        let Some(text) = value.as_str() else {
            continue;
        };
        let keyed = NETWORK_ARGUMENT_KEYS.contains(&key.as_str()) && !text.trim().is_empty();
        if keyed || is_network_url(text) {
            findings.force_high(
                "override:network",
                format!("argument `{key}` targets the network"),
            );
        }
    }
}

fn is_network_url(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.contains(char::is_whitespace) {
        return false;
    }
    url::Url::parse(trimmed)
        .is_ok_and(|url| NETWORK_SCHEMES.contains(&url.scheme()) && url.has_host())
}
