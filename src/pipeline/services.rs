//! Bus responders for the risk engine, confirmation gate, executor and
//! verifier, plus the approver that feeds broker decisions to the gate.

use super::executor::{ExecutionResult, Executor};
use super::messages::{
    PipelineBus, PipelineMessage, TOPIC_CONFIRMATION, TOPIC_CONFIRMATION_PENDING, TOPIC_EXECUTOR,
    TOPIC_RISK, TOPIC_TASK_CANCELLED, TOPIC_VERIFIER,
};
use super::verifier::Verifier;
use crate::bus::{Envelope, Subscription};
use crate::error::ToolError;
use crate::security::{
    ApprovalBroker, ApprovalDecision, ConfirmationGate, RiskEngine, Verdict,
};
use anyhow::bail;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Components that answer pipeline requests.
pub struct StageServices {
    pub risk: Arc<RiskEngine>,
    pub gate: Arc<ConfirmationGate>,
    pub executor: Arc<Executor>,
    pub verifier: Arc<Verifier>,
    pub confirmation_ttl: Duration,
}

fn unexpected(envelope: &Envelope<PipelineMessage>) -> anyhow::Result<()> {
    bail!(
        "unexpected {} message on '{}'",
        envelope.payload.label(),
        envelope.topic
    )
}

/// Subscribe every stage responder. Dropping the returned handles does not
/// unsubscribe; pass them to `MessageBus::unsubscribe` or shut the bus down.
pub fn attach_stage_services(bus: &PipelineBus, services: StageServices) -> Vec<Subscription> {
    let StageServices {
        risk,
        gate,
        executor,
        verifier,
        confirmation_ttl,
    } = services;

    let mut subscriptions = Vec::with_capacity(5);

    let risk_bus = bus.clone();
    subscriptions.push(bus.subscribe(TOPIC_RISK, "risk_engine", move |envelope| {
        let bus = risk_bus.clone();
        let risk = Arc::clone(&risk);
        async move {
            let PipelineMessage::ClassifyStep { step } = &envelope.payload else {
                return unexpected(&envelope);
            };
            let assessment = risk.classify(step);
            bus.reply(&envelope, "risk_engine", PipelineMessage::Assessed(assessment));
            Ok(())
        }
    }));

    // Confirmation waits run in their own task so one pending approval does
    // not hold up other tasks' confirmations.
    let gate_bus = bus.clone();
    let confirm_gate = Arc::clone(&gate);
    subscriptions.push(bus.subscribe(TOPIC_CONFIRMATION, "confirmation_gate", move |envelope| {
        let bus = gate_bus.clone();
        let gate = Arc::clone(&confirm_gate);
        async move {
            let PipelineMessage::ConfirmStep {
                task_id,
                step,
                assessment,
            } = &envelope.payload
            else {
                return unexpected(&envelope);
            };
            let opened = gate.open(*task_id, step, assessment, confirmation_ttl);
            tokio::spawn(async move {
                let outcome = match opened {
                    Ok(request) => {
                        let id = request.confirmation_id();
                        bus.publish(
                            TOPIC_CONFIRMATION_PENDING,
                            "confirmation_gate",
                            PipelineMessage::ConfirmationPending(request),
                        );
                        gate.wait(id).await
                    }
                    Err(e) => Err(e),
                };
                bus.reply(
                    &envelope,
                    "confirmation_gate",
                    PipelineMessage::ConfirmationResolved(outcome),
                );
            });
            Ok(())
        }
    }));

    let cancel_gate = Arc::clone(&gate);
    subscriptions.push(bus.subscribe(TOPIC_TASK_CANCELLED, "confirmation_gate", move |envelope| {
        let gate = Arc::clone(&cancel_gate);
        async move {
            let PipelineMessage::TaskCancelled { task_id } = &envelope.payload else {
                return unexpected(&envelope);
            };
            for request in gate.pending() {
                if request.task_id() != *task_id {
                    continue;
                }
                let verdict = Verdict::Deny {
                    reason: "task cancelled".to_string(),
                };
                if let Err(e) = gate.decide(request.confirmation_id(), verdict) {
                    tracing::debug!(task_id = %task_id, "cancelled confirmation already closed: {e}");
                }
            }
            Ok(())
        }
    }));

    // Every execute request gets a reply, even when the tool panics, since
    // the coordinator waits for it without a deadline.
    let exec_bus = bus.clone();
    subscriptions.push(bus.subscribe(TOPIC_EXECUTOR, "executor", move |envelope| {
        let bus = exec_bus.clone();
        let executor = Arc::clone(&executor);
        async move {
            let PipelineMessage::ExecuteStep {
                task_id,
                step,
                permit,
            } = &envelope.payload
            else {
                return unexpected(&envelope);
            };
            let (task_id, step, permit) = (*task_id, step.clone(), permit.clone());
            tokio::spawn(async move {
                let started = Instant::now();
                let run = {
                    let step = step.clone();
                    tokio::spawn(async move { executor.execute(task_id, &step, &permit).await })
                };
                let result = run.await.unwrap_or_else(|e| {
                    let err = ToolError::Execution {
                        name: step.tool_name.clone(),
                        message: format!("execution aborted: {e}"),
                    };
                    tracing::error!(task_id = %task_id, step_id = %step.step_id, "{err}");
                    ExecutionResult::failed(&step, err.kind(), err.to_string(), started)
                });
                bus.reply(&envelope, "executor", PipelineMessage::Executed(result));
            });
            Ok(())
        }
    }));

    let verify_bus = bus.clone();
    subscriptions.push(bus.subscribe(TOPIC_VERIFIER, "verifier", move |envelope| {
        let bus = verify_bus.clone();
        let verifier = Arc::clone(&verifier);
        async move {
            let PipelineMessage::Verify {
                task_id,
                plan,
                results,
            } = &envelope.payload
            else {
                return unexpected(&envelope);
            };
            let report = verifier.verify(*task_id, plan, results).await;
            bus.reply(&envelope, "verifier", PipelineMessage::Verified(report));
            Ok(())
        }
    }));

    subscriptions
}

/// Forward each pending confirmation to `broker` and apply its decision.
///
/// Requests are handled one at a time. A broker that does not answer before
/// the deadline leaves the request to expire in the gate.
pub fn attach_approver(
    bus: &PipelineBus,
    gate: Arc<ConfirmationGate>,
    broker: Arc<dyn ApprovalBroker>,
) -> Subscription {
    bus.subscribe(TOPIC_CONFIRMATION_PENDING, "approver", move |envelope| {
        let gate = Arc::clone(&gate);
        let broker = Arc::clone(&broker);
        async move {
            let PipelineMessage::ConfirmationPending(request) = &envelope.payload else {
                return unexpected(&envelope);
            };
            let id = request.confirmation_id();
            let remaining = request.remaining(Utc::now());
            let decision =
                match tokio::time::timeout(remaining, broker.request_approval(request)).await {
                    Ok(Ok(decision)) => decision,
                    Ok(Err(e)) => {
                        tracing::warn!(confirmation_id = %id, "approval broker failed: {e:#}");
                        ApprovalDecision::Denied {
                            reason: format!("approval failed: {e}"),
                        }
                    }
                    Err(_) => {
                        tracing::info!(confirmation_id = %id, "no decision before deadline");
                        return Ok(());
                    }
                };
            match gate.decide(id, decision.into()) {
                Ok(resolved) => tracing::debug!(
                    confirmation_id = %id,
                    decision = %resolved.decision(),
                    "approval applied"
                ),
                Err(e) => tracing::warn!(confirmation_id = %id, "approval not applied: {e}"),
            }
            Ok(())
        }
    })
}

/// Periodically expire confirmations nobody is waiting on.
pub fn spawn_expiry_sweeper(
    gate: Arc<ConfirmationGate>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = gate.poll_expired(Utc::now());
                    if !expired.is_empty() {
                        tracing::debug!(count = expired.len(), "swept expired confirmations");
                    }
                }
            }
        }
    })
}
