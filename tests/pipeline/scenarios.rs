use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;

use taskwarden::ErrorKind;
use taskwarden::pipeline::{TaskStatus, TraceEvent};
use taskwarden::security::{ConfirmationDecision, RiskLevel};
use taskwarden::telemetry::{Outcome, Stage};
use taskwarden::tools::FileReadTool;

use crate::pipeline_harness::{
    Behavior, CountingTool, HarnessBuilder, ScriptedBroker, eventually, write_file,
};

#[tokio::test]
async fn low_risk_file_read_completes() {
    let builder = HarnessBuilder::new().tool(FileReadTool).plan(
        "show the readme",
        r#"{"steps": [{"step_id": "1", "tool": "file_read", "args": {"path": "README.md"}}]}"#,
    );
    write_file(&builder.workspace(), "README.md", "# hello\n");
    let harness = builder.start();

    let task = harness.run("show the readme").await;

    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.assessments().len(), 1);
    assert_eq!(task.assessments()[0].level(), RiskLevel::Low);
    assert!(task.confirmations().is_empty());

    let results = task.results();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].data.as_ref().unwrap()["content"], "# hello\n");
    assert!(task.verification().unwrap().matches_intent);
    assert!(task.finished_at().is_some());
}

#[tokio::test]
async fn policy_violation_denies_without_confirmation() {
    let (shell, calls) = CountingTool::succeeding("shell_command", json!({"exit_code": 0}));
    let broker = ScriptedBroker::approving();
    let harness = HarnessBuilder::new()
        .tool(shell)
        .broker(broker.clone())
        .plan(
            "wipe everything",
            r#"[{"tool": "shell_command", "args": {"command": "rm -rf /"}}]"#,
        )
        .start();

    let task = harness.run("wipe everything").await;

    assert_eq!(task.status(), TaskStatus::Denied);
    assert_eq!(task.error_kind(), Some(ErrorKind::PolicyViolation));
    let assessment = task.assessments()[0];
    assert_eq!(assessment.level(), RiskLevel::High);
    assert!(assessment.policy_violation());
    assert!(task.confirmations().is_empty());
    assert!(harness.pipeline.gate().pending().is_empty());
    assert_eq!(broker.asked(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(task.results().is_empty());
}

#[tokio::test]
async fn denied_confirmation_runs_nothing() {
    let (shell, calls) = CountingTool::succeeding("shell_command", json!({"exit_code": 0}));
    let harness = HarnessBuilder::new()
        .tool(shell)
        .broker(ScriptedBroker::denying())
        .plan("list files", r#"[{"tool": "shell_command", "args": {"command": "ls"}}]"#)
        .start();

    let task = harness.run("list files").await;

    assert_eq!(task.status(), TaskStatus::Denied);
    assert_eq!(task.error_kind(), Some(ErrorKind::ConfirmationDenied));
    let confirmations = task.confirmations();
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].decision(), ConfirmationDecision::Denied);
    assert!(confirmations[0].expires_at() > confirmations[0].created_at());
    assert_eq!(confirmations[0].reason(), Some("not today"));
    assert!(task.results().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn approved_confirmation_executes() {
    let (shell, calls) = CountingTool::succeeding(
        "shell_command",
        json!({"command": "ls", "exit_code": 0, "stdout": "README.md\n", "stderr": ""}),
    );
    let harness = HarnessBuilder::new()
        .tool(shell)
        .broker(ScriptedBroker::approving())
        .plan("list files", r#"[{"tool": "shell_command", "args": {"command": "ls"}}]"#)
        .start();

    let task = harness.run("list files").await;

    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(
        task.confirmations()[0].decision(),
        ConfirmationDecision::Approved
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let statuses: Vec<TaskStatus> = task
        .execution_trace()
        .iter()
        .filter_map(|event| match event {
            TraceEvent::StatusChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            TaskStatus::RiskCheck,
            TaskStatus::AwaitingConfirmation,
            TaskStatus::Executing,
            TaskStatus::Verifying,
            TaskStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn expired_confirmation_denies() {
    let (shell, calls) = CountingTool::succeeding("shell_command", json!({"exit_code": 0}));
    let harness = HarnessBuilder::new()
        .tool(shell)
        .broker(ScriptedBroker::silent())
        .confirmation_timeout(Duration::from_millis(150))
        .plan("list files", r#"[{"tool": "shell_command", "args": {"command": "ls"}}]"#)
        .start();

    let task = harness.run("list files").await;

    assert_eq!(task.status(), TaskStatus::Denied);
    assert_eq!(task.error_kind(), Some(ErrorKind::ConfirmationExpired));
    assert_eq!(
        task.confirmations()[0].decision(),
        ConfirmationDecision::Expired
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_middle_step_stops_the_plan() {
    let (first, first_calls) = CountingTool::succeeding("note_list", json!({"count": 0, "notes": []}));
    let (second, second_calls) = CountingTool::failing("reminder_list", "store unavailable");
    let (third, third_calls) =
        CountingTool::succeeding("note_create", json!({"note_id": "x", "path": "notes/x.md"}));
    let harness = HarnessBuilder::new()
        .tool(first)
        .tool(second)
        .tool(third)
        .plan(
            "tidy up",
            r#"[
                {"tool": "note_list", "args": {}},
                {"tool": "reminder_list", "args": {}},
                {"tool": "note_create", "args": {"title": "t", "content": "c"}}
            ]"#,
        )
        .start();

    let task = harness.run("tidy up").await;

    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error_kind(), Some(ErrorKind::ToolExecutionError));
    let results = task.results();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].step_id, "1");
    assert!(results[0].success);
    assert_eq!(results[1].step_id, "2");
    assert!(!results[1].success);
    assert!(results[1].error.as_deref().unwrap().contains("store unavailable"));
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    assert!(task.verification().is_none());
}

#[tokio::test]
async fn each_stage_reports_telemetry() {
    let (notes, _) = CountingTool::succeeding("note_list", json!({"count": 0, "notes": []}));
    let harness = HarnessBuilder::new()
        .tool(notes)
        .plan("list notes", r#"[{"tool": "note_list", "args": {}}]"#)
        .start();

    let task = harness.run("list notes").await;
    assert_eq!(task.status(), TaskStatus::Completed);

    let observer = harness.observer.clone();
    assert!(
        eventually(|| observer
            .events()
            .iter()
            .any(|event| event.stage == Stage::Task))
        .await
    );
    let events = observer.events();
    for stage in [
        Stage::Planning,
        Stage::RiskCheck,
        Stage::Execution,
        Stage::Verification,
        Stage::Task,
    ] {
        let event = events
            .iter()
            .find(|event| event.stage == stage)
            .unwrap_or_else(|| panic!("missing {stage} event"));
        assert_eq!(event.outcome, Outcome::Ok);
        assert_eq!(event.task_id, Some(task.task_id()));
    }
}

#[tokio::test]
async fn overrunning_tool_is_stopped_and_its_failure_recorded() {
    let (slow, calls) = CountingTool::with_behavior(
        "note_list",
        Behavior::SleepThenSucceed(Duration::from_millis(400), json!({"count": 0, "notes": []})),
    );
    let harness = HarnessBuilder::new()
        .tool(slow)
        .execution_timeout(Duration::from_millis(100))
        .plan("list notes", r#"[{"tool": "note_list", "args": {}}]"#)
        .start();

    let task = harness.run("list notes").await;

    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error_kind(), Some(ErrorKind::ToolExecutionError));
    assert_eq!(task.results().len(), 1);
    assert!(task.results()[0].error.as_deref().unwrap().contains("timed out"));
    assert!(
        task.execution_trace()
            .iter()
            .any(|event| matches!(event, TraceEvent::Executed { .. }))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn slow_step_within_its_ceiling_is_never_abandoned() {
    let (slow, calls) = CountingTool::with_behavior(
        "note_list",
        Behavior::SleepThenSucceed(Duration::from_millis(300), json!({"count": 0, "notes": []})),
    );
    let harness = HarnessBuilder::new()
        .tool(slow)
        .execution_timeout(Duration::from_secs(2))
        .plan("list notes", r#"[{"tool": "note_list", "args": {}}]"#)
        .start();

    let task = harness.run("list notes").await;

    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.results().len(), 1);
    assert!(task.results()[0].success);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_tool_fails_the_task_instead_of_hanging() {
    let (tool, calls) = CountingTool::with_behavior("note_list", Behavior::Panic);
    let harness = HarnessBuilder::new()
        .tool(tool)
        .plan("list notes", r#"[{"tool": "note_list", "args": {}}]"#)
        .start();

    let task = tokio::time::timeout(Duration::from_secs(3), harness.run("list notes"))
        .await
        .expect("task must finish");

    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error_kind(), Some(ErrorKind::ToolExecutionError));
    assert!(task.results()[0].error.as_deref().unwrap().contains("aborted"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

