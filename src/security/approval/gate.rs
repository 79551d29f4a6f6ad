//! Pending human confirmations for HIGH-risk steps.
//!
//! Each request moves `pending -> approved | denied | expired` exactly once.
//! Expiry happens when a waiter's deadline elapses, when a late decision
//! arrives, or when `poll_expired` sweeps the table; all three lead to the
//! same terminal state.

use super::summarize_args;
use crate::error::ConfirmationError;
use crate::pipeline::PlanStep;
use crate::security::risk::RiskAssessment;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// How long a resolved request stays readable when no waiter collects it.
const RESOLVED_RETENTION: chrono::Duration = chrono::Duration::minutes(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConfirmationDecision {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl ConfirmationDecision {
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Deny { reason: String },
}

/// Snapshot of one confirmation. Built only by [`ConfirmationGate`].
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRequest {
    confirmation_id: Uuid,
    task_id: Uuid,
    step_id: String,
    tool_name: String,
    #[serde(skip)]
    step_fingerprint: String,
    summary: String,
    rationale: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    decision: ConfirmationDecision,
    decided_at: Option<DateTime<Utc>>,
    reason: Option<String>,
}

impl ConfirmationRequest {
    pub fn confirmation_id(&self) -> Uuid {
        self.confirmation_id
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

    /// [`PlanStep::fingerprint`] of the step shown to the approver.
    pub fn step_fingerprint(&self) -> &str {
        &self.step_fingerprint
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn decision(&self) -> ConfirmationDecision {
        self.decision
    }

    pub fn decided_at(&self) -> Option<DateTime<Utc>> {
        self.decided_at
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Time left before expiry, zero once past the deadline.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    fn resolve(&mut self, decision: ConfirmationDecision, at: DateTime<Utc>, reason: Option<String>) {
        self.decision = decision;
        self.decided_at = Some(at);
        self.reason = reason;
    }
}

struct Entry {
    request: ConfirmationRequest,
    notify: watch::Sender<ConfirmationDecision>,
}

#[derive(Default)]
pub struct ConfirmationGate {
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a confirmation for a HIGH-risk, policy-clean step.
    pub fn open(
        &self,
        task_id: Uuid,
        step: &PlanStep,
        assessment: &RiskAssessment,
        ttl: Duration,
    ) -> Result<ConfirmationRequest, ConfirmationError> {
        if !assessment.requires_confirmation() || !assessment.covers(step) {
            return Err(ConfirmationError::NotRequired {
                step_id: step.step_id.clone(),
            });
        }

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let request = ConfirmationRequest {
            confirmation_id: Uuid::new_v4(),
            task_id,
            step_id: step.step_id.clone(),
            tool_name: step.tool_name.clone(),
            step_fingerprint: step.fingerprint(),
            summary: summarize_args(&step.tool_name, &step.arguments),
            rationale: assessment.rationale().to_string(),
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            decision: ConfirmationDecision::Pending,
            decided_at: None,
            reason: None,
        };

        let (notify, _) = watch::channel(ConfirmationDecision::Pending);
        self.entries().insert(
            request.confirmation_id,
            Entry {
                request: request.clone(),
                notify,
            },
        );
        tracing::info!(
            confirmation_id = %request.confirmation_id,
            task_id = %task_id,
            step_id = %request.step_id,
            expires_at = %request.expires_at,
            "confirmation opened"
        );
        Ok(request)
    }

    pub fn decide(&self, id: Uuid, verdict: Verdict) -> Result<ConfirmationRequest, ConfirmationError> {
        self.decide_at(id, verdict, Utc::now())
    }

    /// Apply a decision as of `now`. A decision after the deadline expires
    /// the request instead and reports `Expired`.
    pub fn decide_at(
        &self,
        id: Uuid,
        verdict: Verdict,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationRequest, ConfirmationError> {
        let mut entries = self.entries();
        let entry = entries.get_mut(&id).ok_or(ConfirmationError::NotFound(id))?;

        if entry.request.decision.is_terminal() {
            return Err(ConfirmationError::AlreadyResolved {
                id,
                decision: entry.request.decision.to_string(),
            });
        }

        if now > entry.request.expires_at {
            expire_entry(entry, now);
            return Err(ConfirmationError::Expired(id));
        }

        let (decision, reason) = match verdict {
            Verdict::Approve => (ConfirmationDecision::Approved, None),
            Verdict::Deny { reason } => (ConfirmationDecision::Denied, Some(reason)),
        };
        entry.request.resolve(decision, now, reason);
        entry.notify.send_replace(decision);
        tracing::info!(confirmation_id = %id, decision = %decision, "confirmation decided");
        Ok(entry.request.clone())
    }

    /// Wait for a terminal decision; expires the request at its deadline.
    ///
    /// Each request has a single waiter: the resolved entry is removed from
    /// the gate when its final snapshot is returned.
    pub async fn wait(&self, id: Uuid) -> Result<ConfirmationRequest, ConfirmationError> {
        let (mut rx, expires_at) = {
            let entries = self.entries();
            let entry = entries.get(&id).ok_or(ConfirmationError::NotFound(id))?;
            (entry.notify.subscribe(), entry.request.expires_at)
        };

        loop {
            if rx.borrow_and_update().is_terminal() {
                return self.take(id);
            }

            let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            match tokio::time::timeout(remaining, rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(ConfirmationError::NotFound(id)),
                Err(_) => {
                    if let Some(entry) = self.entries().get_mut(&id)
                        && !entry.request.decision.is_terminal()
                    {
                        expire_entry(entry, Utc::now());
                    }
                    return self.take(id);
                }
            }
        }
    }

    /// Expire every pending request whose deadline is before `now`, and drop
    /// resolved requests that nobody collected within `RESOLVED_RETENTION`.
    pub fn poll_expired(&self, now: DateTime<Utc>) -> Vec<ConfirmationRequest> {
        let mut entries = self.entries();
        let expired: Vec<ConfirmationRequest> = entries
            .values_mut()
            .filter(|entry| {
                entry.request.decision == ConfirmationDecision::Pending
                    && now > entry.request.expires_at
            })
            .map(|entry| {
                expire_entry(entry, now);
                entry.request.clone()
            })
            .collect();

        let before = entries.len();
        entries.retain(|_, entry| {
            entry
                .request
                .decided_at
                .is_none_or(|decided| now - decided < RESOLVED_RETENTION)
        });
        let pruned = before - entries.len();
        if pruned > 0 {
            tracing::debug!(pruned, "dropped stale resolved confirmations");
        }
        expired
    }

    pub fn get(&self, id: Uuid) -> Option<ConfirmationRequest> {
        self.entries().get(&id).map(|entry| entry.request.clone())
    }

    pub fn pending(&self) -> Vec<ConfirmationRequest> {
        let mut pending: Vec<ConfirmationRequest> = self
            .entries()
            .values()
            .filter(|entry| entry.request.decision == ConfirmationDecision::Pending)
            .map(|entry| entry.request.clone())
            .collect();
        pending.sort_by_key(ConfirmationRequest::created_at);
        pending
    }

    fn take(&self, id: Uuid) -> Result<ConfirmationRequest, ConfirmationError> {
        self.entries()
            .remove(&id)
            .map(|entry| entry.request)
            .ok_or(ConfirmationError::NotFound(id))
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn expire_entry(entry: &mut Entry, now: DateTime<Utc>) {
    entry
        .request
        .resolve(ConfirmationDecision::Expired, now, Some("confirmation timed out".into()));
    entry.notify.send_replace(ConfirmationDecision::Expired);
    tracing::info!(
        confirmation_id = %entry.request.confirmation_id,
        step_id = %entry.request.step_id,
        "confirmation expired"
    );
}
