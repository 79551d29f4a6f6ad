use super::gate::{ConfirmationDecision, ConfirmationRequest};
use crate::error::SecurityError;
use crate::pipeline::PlanStep;
use crate::security::risk::{RiskAssessment, RiskLevel};
use uuid::Uuid;

/// Proof that a step passed risk gating.
///
/// The executor takes a permit by reference instead of trusting its caller.
/// The only constructor is [`ExecutionPermit::grant`], which requires a
/// clean assessment of the exact step and, for HIGH risk, an approved
/// confirmation opened for the same task, step and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPermit {
    task_id: Uuid,
    step_id: String,
    tool_name: String,
    fingerprint: String,
    level: RiskLevel,
    confirmation_id: Option<Uuid>,
}

fn mismatch(step: &PlanStep, reason: impl Into<String>) -> SecurityError {
    SecurityError::PermitMismatch {
        step_id: step.step_id.clone(),
        reason: reason.into(),
    }
}

impl ExecutionPermit {
    pub fn grant(
        task_id: Uuid,
        step: &PlanStep,
        assessment: &RiskAssessment,
        confirmation: Option<&ConfirmationRequest>,
    ) -> Result<Self, SecurityError> {
        if !assessment.covers(step) {
            return Err(mismatch(
                step,
                format!("assessment was made for step {}", assessment.step_id()),
            ));
        }
        let step_id = step.step_id.clone();

        if assessment.policy_violation() {
            return Err(SecurityError::PolicyViolation {
                step_id,
                reason: assessment.rationale().to_string(),
            });
        }

        let confirmation_id = match assessment.level() {
            RiskLevel::Low | RiskLevel::Medium => None,
            RiskLevel::High => {
                let Some(confirmation) = confirmation else {
                    return Err(SecurityError::ConfirmationRequired { step_id });
                };
                if confirmation.task_id() != task_id {
                    return Err(mismatch(step, "confirmation belongs to another task"));
                }
                if confirmation.step_id() != step.step_id
                    || confirmation.step_fingerprint() != assessment.fingerprint()
                {
                    return Err(mismatch(
                        step,
                        format!(
                            "confirmation was opened for step {} with other arguments",
                            confirmation.step_id()
                        ),
                    ));
                }
                match confirmation.decision() {
                    ConfirmationDecision::Approved => Some(confirmation.confirmation_id()),
                    ConfirmationDecision::Denied => {
                        return Err(SecurityError::ConfirmationDenied {
                            step_id,
                            reason: confirmation.reason().unwrap_or("denied").to_string(),
                        });
                    }
                    ConfirmationDecision::Expired => {
                        return Err(SecurityError::ConfirmationExpired { step_id });
                    }
                    ConfirmationDecision::Pending => {
                        return Err(SecurityError::ConfirmationRequired { step_id });
                    }
                }
            }
        };

        Ok(Self {
            task_id,
            step_id,
            tool_name: step.tool_name.clone(),
            fingerprint: assessment.fingerprint().to_string(),
            level: assessment.level(),
            confirmation_id,
        })
    }

    /// Refuse any invocation other than the one this permit was granted for.
    pub fn check(&self, task_id: Uuid, step: &PlanStep) -> Result<(), SecurityError> {
        if self.task_id != task_id {
            return Err(mismatch(step, format!("issued for task {}", self.task_id)));
        }
        if self.step_id != step.step_id {
            return Err(mismatch(step, format!("issued for step {}", self.step_id)));
        }
        if self.fingerprint != step.fingerprint() {
            return Err(mismatch(step, "tool or arguments differ from the assessed step"));
        }
        Ok(())
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn level(&self) -> RiskLevel {
        self.level
    }

    pub fn confirmation_id(&self) -> Option<Uuid> {
        self.confirmation_id
    }
}
