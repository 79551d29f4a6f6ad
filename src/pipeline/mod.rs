//! Request pipeline: plan, classify, confirm, execute, verify.
//!
//! [`Pipeline::start`] wires the stage services, the approver and the
//! telemetry sink onto one bus and hands back the coordinator.

pub mod coordinator;
pub mod executor;
pub mod messages;
pub mod plan;
pub mod planner;
pub mod services;
pub mod task;
pub mod verifier;

pub use coordinator::{PipelineSettings, TaskCoordinator};
pub use executor::{ExecutionResult, Executor};
pub use messages::{PipelineBus, PipelineMessage};
pub use plan::{ExecutionPlan, PlanStep};
pub use planner::{
    CommandPlanner, PlanOutcome, Planner, PlanningInput, StaticPlanner, parse_planner_output,
};
pub use services::{StageServices, attach_approver, attach_stage_services, spawn_expiry_sweeper};
pub use task::{Task, TaskStatus, TraceEvent};
pub use verifier::{VerificationReport, Verifier};

use crate::bus::Subscription;
use crate::reminders::ReminderStore;
use crate::security::{ApprovalBroker, ConfirmationGate, RiskEngine};
use crate::telemetry::{Observer, TelemetrySink};
use crate::tools::{ExecutionContext, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Everything needed to assemble a pipeline.
pub struct PipelineComponents {
    pub registry: Arc<ToolRegistry>,
    pub planner: Arc<dyn Planner>,
    pub risk: RiskEngine,
    pub broker: Arc<dyn ApprovalBroker>,
    pub context: ExecutionContext,
    pub settings: PipelineSettings,
    pub observer: Arc<dyn Observer>,
    /// Store the verifier checks `reminder_set` results against.
    pub reminders: Option<Arc<ReminderStore>>,
}

/// A running pipeline. Must be started inside a Tokio runtime.
pub struct Pipeline {
    bus: PipelineBus,
    coordinator: Arc<TaskCoordinator>,
    gate: Arc<ConfirmationGate>,
    observer: Arc<dyn Observer>,
    subscriptions: Vec<Subscription>,
    sweeper: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn start(components: PipelineComponents) -> Self {
        let PipelineComponents {
            registry,
            planner,
            risk,
            broker,
            context,
            settings,
            observer,
            reminders,
        } = components;

        let bus = PipelineBus::new();
        let gate = Arc::new(ConfirmationGate::new());
        let mut verifier = Verifier::new(context.workspace_dir.clone());
        if let Some(store) = reminders {
            verifier = verifier.with_reminders(store);
        }
        let verifier = Arc::new(verifier);
        let executor = Arc::new(
            Executor::new(Arc::clone(&registry), context)
                .with_step_timeout(settings.execution_timeout),
        );

        let mut subscriptions = attach_stage_services(
            &bus,
            StageServices {
                risk: Arc::new(risk),
                gate: Arc::clone(&gate),
                executor,
                verifier,
                confirmation_ttl: settings.confirmation_timeout,
            },
        );
        subscriptions.push(attach_approver(&bus, Arc::clone(&gate), broker));
        subscriptions.push(TelemetrySink::attach(&bus, Arc::clone(&observer)));

        let shutdown = CancellationToken::new();
        let sweeper = spawn_expiry_sweeper(Arc::clone(&gate), SWEEP_INTERVAL, shutdown.clone());
        let coordinator = Arc::new(TaskCoordinator::new(
            bus.clone(),
            planner,
            registry,
            settings,
        ));

        tracing::debug!(subscribers = subscriptions.len(), "pipeline started");
        Self {
            bus,
            coordinator,
            gate,
            observer,
            subscriptions,
            sweeper: Some(sweeper),
            shutdown,
        }
    }

    pub fn coordinator(&self) -> &Arc<TaskCoordinator> {
        &self.coordinator
    }

    pub fn gate(&self) -> &Arc<ConfirmationGate> {
        &self.gate
    }

    pub fn bus(&self) -> &PipelineBus {
        &self.bus
    }

    /// Stop the sweeper, detach every subscriber and flush telemetry.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(sweeper) = self.sweeper.take()
            && let Err(e) = sweeper.await
        {
            tracing::warn!("confirmation sweeper ended abnormally: {e}");
        }
        for subscription in &self.subscriptions {
            self.bus.unsubscribe(subscription);
        }
        self.bus.shutdown();
        self.observer.flush();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
