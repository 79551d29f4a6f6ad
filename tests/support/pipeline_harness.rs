#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use taskwarden::error::PlanError;
use taskwarden::pipeline::{
    Pipeline, PipelineComponents, PipelineSettings, PlanOutcome, Planner, PlanningInput, Task,
    TaskStatus, parse_planner_output,
};
use taskwarden::security::{
    ApprovalBroker, ApprovalDecision, ConfirmationRequest, PolicyTable, RiskEngine, SandboxPolicy,
};
use taskwarden::reminders::ReminderStore;
use taskwarden::telemetry::{Observer, TelemetryEvent};
use taskwarden::tools::{ExecutionContext, Tool, ToolRegistry, ToolResult};

/// Tool double registered under a builtin name; counts invocations.
pub struct CountingTool {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    schema: Value,
    behavior: Behavior,
}

#[derive(Clone)]
pub enum Behavior {
    Succeed(Value),
    Fail(&'static str),
    SleepThenSucceed(Duration, Value),
    Panic,
}

impl CountingTool {
    pub fn succeeding(name: &'static str, data: Value) -> (Self, Arc<AtomicUsize>) {
        Self::with_behavior(name, Behavior::Succeed(data))
    }

    pub fn failing(name: &'static str, error: &'static str) -> (Self, Arc<AtomicUsize>) {
        Self::with_behavior(name, Behavior::Fail(error))
    }

    pub fn with_behavior(name: &'static str, behavior: Behavior) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                calls: Arc::clone(&calls),
                schema: json!({"type": "object"}),
                behavior,
            },
            calls,
        )
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

impl Tool for CountingTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "test double"
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn execute<'a>(
        &'a self,
        _args: Value,
        _ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed(data) => Ok(ToolResult::ok("done", data.clone())),
                Behavior::Fail(error) => Ok(ToolResult {
                    success: false,
                    output: String::new(),
                    error: Some((*error).to_string()),
                    data: None,
                }),
                Behavior::SleepThenSucceed(delay, data) => {
                    tokio::time::sleep(*delay).await;
                    Ok(ToolResult::ok("done", data.clone()))
                }
                Behavior::Panic => panic!("tool blew up"),
            }
        })
    }
}

/// Answers every confirmation the same way, optionally after a delay.
pub struct ScriptedBroker {
    decision: Option<ApprovalDecision>,
    delay: Duration,
    asked: AtomicUsize,
}

impl ScriptedBroker {
    pub fn approving() -> Arc<Self> {
        Arc::new(Self::new(Some(ApprovalDecision::Approved), Duration::ZERO))
    }

    pub fn denying() -> Arc<Self> {
        Arc::new(Self::new(
            Some(ApprovalDecision::Denied {
                reason: "not today".into(),
            }),
            Duration::ZERO,
        ))
    }

    /// Never answers; confirmations run into their deadline.
    pub fn silent() -> Arc<Self> {
        Arc::new(Self::new(None, Duration::ZERO))
    }

    fn new(decision: Option<ApprovalDecision>, delay: Duration) -> Self {
        Self {
            decision,
            delay,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl ApprovalBroker for ScriptedBroker {
    fn request_approval<'a>(
        &'a self,
        _request: &'a ConfirmationRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ApprovalDecision>> + Send + 'a>> {
        Box::pin(async move {
            self.asked.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match &self.decision {
                Some(decision) => Ok(decision.clone()),
                None => std::future::pending().await,
            }
        })
    }
}

/// Returns a fixed plan per request text; unknown requests cannot be planned.
pub struct RoutingPlanner {
    plans: HashMap<String, String>,
}

impl RoutingPlanner {
    pub fn new(routes: &[(&str, &str)]) -> Self {
        Self {
            plans: routes
                .iter()
                .map(|(request, plan)| ((*request).to_string(), (*plan).to_string()))
                .collect(),
        }
    }
}

impl Planner for RoutingPlanner {
    fn name(&self) -> &str {
        "routing"
    }

    fn plan<'a>(
        &'a self,
        input: &'a PlanningInput,
    ) -> Pin<Box<dyn Future<Output = Result<PlanOutcome, PlanError>> + Send + 'a>> {
        Box::pin(async move {
            match self.plans.get(&input.raw_request) {
                Some(raw) => parse_planner_output(raw),
                None => Ok(PlanOutcome::CannotPlan {
                    reason: format!("no plan for '{}'", input.raw_request),
                }),
            }
        })
    }
}

#[derive(Default)]
pub struct CapturingObserver {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl CapturingObserver {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Observer for CapturingObserver {
    fn record(&self, event: &TelemetryEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &str {
        "capture"
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub pipeline: Pipeline,
    pub observer: Arc<CapturingObserver>,
}

impl Harness {
    pub fn workspace(&self) -> PathBuf {
        self.tmp.path().join("workspace")
    }

    pub async fn run(&self, request: &str) -> Task {
        self.pipeline.coordinator().run(request).await.unwrap()
    }
}

pub struct HarnessBuilder {
    tmp: TempDir,
    tools: Vec<Box<dyn Tool>>,
    routes: Vec<(String, String)>,
    broker: Arc<dyn ApprovalBroker>,
    settings: PipelineSettings,
    reminders: Option<Arc<ReminderStore>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("workspace")).unwrap();
        Self {
            tmp,
            tools: Vec::new(),
            routes: Vec::new(),
            broker: ScriptedBroker::denying(),
            settings: PipelineSettings {
                bus_timeout: Duration::from_secs(5),
                confirmation_timeout: Duration::from_secs(5),
                execution_timeout: Duration::from_secs(5),
            },
            reminders: None,
        }
    }

    pub fn workspace(&self) -> PathBuf {
        self.tmp.path().join("workspace")
    }

    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Box::new(tool));
        self
    }

    pub fn plan(mut self, request: &str, plan_json: &str) -> Self {
        self.routes.push((request.to_string(), plan_json.to_string()));
        self
    }

    pub fn broker(mut self, broker: Arc<dyn ApprovalBroker>) -> Self {
        self.broker = broker;
        self
    }

    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.settings.confirmation_timeout = timeout;
        self
    }

    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.settings.execution_timeout = timeout;
        self
    }

    pub fn reminders(mut self, store: Arc<ReminderStore>) -> Self {
        self.reminders = Some(store);
        self
    }

    pub fn start(self) -> Harness {
        let workspace = self.tmp.path().join("workspace");
        let registry: ToolRegistry = self.tools.into_iter().collect();
        let routes: Vec<(&str, &str)> = self
            .routes
            .iter()
            .map(|(request, plan)| (request.as_str(), plan.as_str()))
            .collect();
        let observer = Arc::new(CapturingObserver::default());

        let pipeline = Pipeline::start(PipelineComponents {
            registry: Arc::new(registry),
            planner: Arc::new(RoutingPlanner::new(&routes)),
            risk: RiskEngine::new(PolicyTable::builtin(), SandboxPolicy::with_root(&workspace)),
            broker: self.broker,
            context: ExecutionContext::for_workspace(workspace),
            settings: self.settings,
            observer: observer.clone(),
            reminders: self.reminders,
        });

        Harness {
            tmp: self.tmp,
            pipeline,
            observer,
        }
    }
}

/// Poll until `check` holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn wait_for_status(harness: &Harness, task_id: uuid::Uuid, status: TaskStatus) -> impl FnMut() -> bool + '_ {
    move || {
        harness
            .pipeline
            .coordinator()
            .task(task_id)
            .is_some_and(|task| task.status() == status)
    }
}

pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}
