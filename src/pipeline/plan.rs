use crate::error::PlanError;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// One tool invocation proposed by the planner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    pub step_id: String,
    pub tool_name: String,
    /// Argument object; keys are unique (duplicates are rejected at parse).
    pub arguments: Map<String, Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Optional JSON schema the step's result data must satisfy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<Value>,
}

impl PlanStep {
    /// Build a step in code. Non-object `arguments` become an empty map.
    pub fn new(step_id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            step_id: step_id.into(),
            tool_name: tool_name.into(),
            arguments,
            description: String::new(),
            expected_output: None,
        }
    }

    #[must_use]
    pub fn with_expected_output(mut self, schema: Value) -> Self {
        self.expected_output = Some(schema);
        self
    }

    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }

    /// Canonical `[tool_name, arguments]` encoding. Object keys serialize in
    /// sorted order, so equal invocations always share a fingerprint.
    pub fn fingerprint(&self) -> String {
        Value::Array(vec![
            Value::String(self.tool_name.clone()),
            self.arguments_value(),
        ])
        .to_string()
    }
}

/// Ordered, validated sequence of steps. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// Validate and wrap `steps`: non-empty, unique non-blank step ids,
    /// non-blank tool names.
    pub fn new(steps: Vec<PlanStep>) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::Schema("plan has no steps".into()));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if step.step_id.trim().is_empty() {
                return Err(PlanError::Schema("step_id must not be empty".into()));
            }
            if step.tool_name.trim().is_empty() {
                return Err(PlanError::Schema(format!(
                    "step {}: tool_name must not be empty",
                    step.step_id
                )));
            }
            if !seen.insert(step.step_id.as_str()) {
                return Err(PlanError::Schema(format!(
                    "duplicate step_id '{}'",
                    step.step_id
                )));
            }
        }

        Ok(Self { steps })
    }

    /// Parse planner output: `{"steps": [...]}` or a bare array of steps.
    ///
    /// Steps accept `tool`/`tool_name` and `args`/`arguments`; a missing
    /// `step_id` is numbered from 1 by position.
    pub fn parse(json: &str) -> Result<Self, PlanError> {
        let trimmed = json.trim_start();
        let raw_steps = if trimmed.starts_with('[') {
            serde_json::from_str::<Vec<RawStep>>(trimmed)
        } else {
            serde_json::from_str::<RawPlan>(trimmed).map(|plan| plan.steps)
        }
        .map_err(|e| PlanError::Schema(e.to_string()))?;

        let steps = raw_steps
            .into_iter()
            .enumerate()
            .map(|(index, raw)| raw.into_step(index + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(steps)
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.step_id == step_id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.tool_name.as_str())
    }
}

#[derive(Deserialize)]
struct RawPlan {
    steps: Vec<RawStep>,
}

#[derive(Deserialize)]
struct RawStep {
    #[serde(default)]
    step_id: Option<Value>,
    #[serde(alias = "tool")]
    tool_name: String,
    #[serde(default, alias = "args")]
    arguments: Option<UniqueArguments>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    expected_output: Option<Value>,
}

impl RawStep {
    fn into_step(self, position: usize) -> Result<PlanStep, PlanError> {
        let step_id = match self.step_id {
            None | Some(Value::Null) => position.to_string(),
            Some(Value::String(id)) => id,
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(PlanError::Schema(format!(
                    "step {position}: step_id must be a string or number, got {other}"
                )));
            }
        };

        Ok(PlanStep {
            step_id,
            tool_name: self.tool_name,
            arguments: self.arguments.map(|args| args.0).unwrap_or_default(),
            description: self.description,
            expected_output: self.expected_output,
        })
    }
}

/// Argument object that refuses repeated keys instead of keeping the last.
struct UniqueArguments(Map<String, Value>);

impl<'de> Deserialize<'de> for UniqueArguments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ArgumentsVisitor;

        impl<'de> Visitor<'de> for ArgumentsVisitor {
            type Value = UniqueArguments;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of tool arguments")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = Map::new();
                while let Some(key) = access.next_key::<String>()? {
                    if map.contains_key(&key) {
                        return Err(de::Error::custom(format!(
                            "duplicate argument key '{key}'"
                        )));
                    }
                    let value: Value = access.next_value()?;
                    map.insert(key, value);
                }
                Ok(UniqueArguments(map))
            }
        }

        deserializer.deserialize_map(ArgumentsVisitor)
    }
}
