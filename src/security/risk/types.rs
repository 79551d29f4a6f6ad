use crate::error::ConfigError;
use crate::pipeline::PlanStep;
use crate::tools::ToolKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use strum::IntoEnumIterator;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Outcome of classifying one plan step.
///
/// Only the risk engine builds these; the fields are read through accessors
/// so an assessment cannot be forged downstream of classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    step_id: String,
    tool_name: String,
    #[serde(skip)]
    fingerprint: String,
    level: RiskLevel,
    rationale: String,
    policy_violation: bool,
    matched_rules: Vec<String>,
}

impl RiskAssessment {
    pub(crate) fn new(
        step: &PlanStep,
        level: RiskLevel,
        rationale: String,
        policy_violation: bool,
        matched_rules: Vec<String>,
    ) -> Self {
        Self {
            step_id: step.step_id.clone(),
            tool_name: step.tool_name.clone(),
            fingerprint: step.fingerprint(),
            level,
            rationale,
            policy_violation,
            matched_rules,
        }
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// [`PlanStep::fingerprint`] of the classified step.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Whether this assessment was made for exactly `step`.
    pub fn covers(&self, step: &PlanStep) -> bool {
        self.step_id == step.step_id && self.fingerprint == step.fingerprint()
    }

    pub fn level(&self) -> RiskLevel {
        self.level
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn policy_violation(&self) -> bool {
        self.policy_violation
    }

    pub fn matched_rules(&self) -> &[String] {
        &self.matched_rules
    }

    pub fn requires_confirmation(&self) -> bool {
        self.level == RiskLevel::High && !self.policy_violation
    }
}

/// Static `tool_name -> level` table consulted before argument overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    levels: BTreeMap<String, RiskLevel>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PolicyTable {
    pub fn builtin() -> Self {
        let levels = ToolKind::iter()
            .map(|kind| (kind.to_string(), kind.default_risk()))
            .collect();
        Self { levels }
    }

    /// Builtin table with config overrides applied; overrides may add tools.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut table = Self::builtin();
        for (tool, raw) in overrides {
            let level = RiskLevel::from_str(raw).map_err(|_| {
                ConfigError::Validation(format!("unknown risk level '{raw}' for {tool}"))
            })?;
            table.set(tool, level);
        }
        Ok(table)
    }

    pub fn set(&mut self, tool: &str, level: RiskLevel) {
        self.levels.insert(tool.to_string(), level);
    }

    pub fn level_for(&self, tool: &str) -> Option<RiskLevel> {
        self.levels.get(tool).copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, RiskLevel)> {
        self.levels.iter().map(|(name, level)| (name.as_str(), *level))
    }
}
