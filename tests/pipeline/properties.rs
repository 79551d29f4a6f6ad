use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::json;

use taskwarden::ErrorKind;
use taskwarden::pipeline::{PlanStep, TaskStatus, TraceEvent};
use taskwarden::security::{PolicyTable, RiskEngine, SandboxPolicy};
use taskwarden::reminders::ReminderStore;
use taskwarden::tools::{FileWriteTool, ReminderSetTool};

use crate::pipeline_harness::{CountingTool, HarnessBuilder, ScriptedBroker};

fn reached(task: &taskwarden::pipeline::Task, status: TaskStatus) -> bool {
    task.execution_trace().iter().any(|event| {
        matches!(event, TraceEvent::StatusChanged { to, .. } if *to == status)
    })
}

#[tokio::test]
async fn unknown_tool_fails_before_risk_check() {
    let (notes, calls) = CountingTool::succeeding("note_list", json!({"count": 0, "notes": []}));
    let harness = HarnessBuilder::new()
        .tool(notes)
        .plan(
            "launch",
            r#"[{"tool": "note_list", "args": {}}, {"tool": "launch_rocket", "args": {}}]"#,
        )
        .start();

    let task = harness.run("launch").await;

    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error_kind(), Some(ErrorKind::UnknownTool));
    assert!(!reached(&task, TaskStatus::RiskCheck));
    assert!(task.assessments().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn risk_engine_rejects_unregistered_tool_names() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = RiskEngine::new(PolicyTable::builtin(), SandboxPolicy::with_root(tmp.path()));
    for name in ["launch_rocket", "FILE_READ", "file-read", ""] {
        let step = PlanStep::new("1", name, json!({}));
        let err = engine.classify(&step).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownTool, "{name}");
    }
}

#[test]
fn classification_is_idempotent_across_tools() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = RiskEngine::new(PolicyTable::builtin(), SandboxPolicy::with_root(tmp.path()));
    let steps = [
        PlanStep::new("1", "file_read", json!({"path": "README.md"})),
        PlanStep::new("2", "file_write", json!({"path": "a.txt", "content": "x", "mode": "overwrite"})),
        PlanStep::new("3", "shell_command", json!({"command": "ls | wc -l"})),
        PlanStep::new("4", "shell_command", json!({"command": "sudo reboot"})),
        PlanStep::new("5", "note_create", json!({"title": "t", "content": "https://example.com"})),
        PlanStep::new("6", "reminder_set", json!({"message": "m", "time": "5m"})),
    ];
    for step in &steps {
        assert_eq!(engine.classify(step), engine.classify(step));
    }
}

#[tokio::test]
async fn malformed_plan_never_enters_risk_check() {
    let harness = HarnessBuilder::new()
        .plan(
            "broken",
            r#"[{"tool": "note_list", "args": {"a": 1, "a": 2}}]"#,
        )
        .plan("empty", r#"{"steps": []}"#)
        .start();

    for request in ["broken", "empty", "no plan for this"] {
        let task = harness.run(request).await;
        assert_eq!(task.status(), TaskStatus::Failed, "{request}");
        assert_eq!(task.error_kind(), Some(ErrorKind::PlanSchemaError), "{request}");
        assert!(task.plan().is_none());
        assert!(!reached(&task, TaskStatus::RiskCheck));
    }
}

#[tokio::test]
async fn schema_mismatch_never_reaches_the_tool() {
    let (reader, calls) = CountingTool::succeeding("file_read", json!({"content": "x"}));
    let reader = reader.with_schema(json!({
        "type": "object",
        "properties": {"path": {"type": "string"}},
        "required": ["path"],
        "additionalProperties": false
    }));
    let harness = HarnessBuilder::new()
        .tool(reader)
        .plan("read", r#"[{"tool": "file_read", "args": {"file": "README.md"}}]"#)
        .start();

    let task = harness.run("read").await;

    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error_kind(), Some(ErrorKind::InvalidArguments));
    assert_eq!(task.results().len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn denial_skips_the_rest_of_the_plan() {
    let (notes, note_calls) = CountingTool::succeeding("note_list", json!({"count": 0, "notes": []}));
    let (shell, shell_calls) = CountingTool::succeeding("shell_command", json!({"exit_code": 0}));
    let (writer, write_calls) = CountingTool::succeeding("file_write", json!({"path": "README.md"}));
    let broker = ScriptedBroker::denying();
    let harness = HarnessBuilder::new()
        .tool(notes)
        .tool(shell)
        .tool(writer)
        .broker(broker.clone())
        .plan(
            "mixed",
            r#"[
                {"tool": "note_list", "args": {}},
                {"tool": "shell_command", "args": {"command": "git status"}},
                {"tool": "file_write", "args": {"path": "out.txt", "content": "x"}},
                {"tool": "shell_command", "args": {"command": "ls"}}
            ]"#,
        )
        .start();

    let task = harness.run("mixed").await;

    assert_eq!(task.status(), TaskStatus::Denied);
    assert_eq!(task.error_kind(), Some(ErrorKind::ConfirmationDenied));
    assert_eq!(task.assessments().len(), 4);
    assert_eq!(task.results().len(), 1);
    assert_eq!(note_calls.load(Ordering::SeqCst), 1);
    assert_eq!(shell_calls.load(Ordering::SeqCst), 0);
    assert_eq!(write_calls.load(Ordering::SeqCst), 0);
    assert_eq!(broker.asked(), 1);
}

#[tokio::test]
async fn violation_anywhere_denies_before_execution() {
    let (notes, note_calls) = CountingTool::succeeding("note_list", json!({"count": 0, "notes": []}));
    let harness = HarnessBuilder::new()
        .tool(notes)
        .tool(FileWriteTool)
        .plan(
            "sneaky",
            r#"[
                {"tool": "note_list", "args": {}},
                {"tool": "file_write", "args": {"path": "../../etc/cron.d/x", "content": "x"}}
            ]"#,
        )
        .start();

    let task = harness.run("sneaky").await;

    assert_eq!(task.status(), TaskStatus::Denied);
    assert_eq!(task.error_kind(), Some(ErrorKind::PolicyViolation));
    assert_eq!(task.assessments().len(), 2);
    assert_eq!(note_calls.load(Ordering::SeqCst), 0);
    assert!(!reached(&task, TaskStatus::Executing));
}

#[tokio::test]
async fn unobservable_side_effect_is_a_verification_mismatch() {
    let (writer, _) = CountingTool::succeeding(
        "file_write",
        json!({"path": "never/written.txt", "bytes_written": 3}),
    );
    let harness = HarnessBuilder::new()
        .tool(writer)
        .plan(
            "write",
            r#"[{"tool": "file_write", "args": {"path": "never/written.txt", "content": "abc"}}]"#,
        )
        .start();

    let task = harness.run("write").await;

    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error_kind(), Some(ErrorKind::VerificationMismatch));
    let report = task.verification().unwrap();
    assert!(!report.matches_intent);
    assert!(!report.anomalies.is_empty());
    assert_eq!(task.results().len(), 1);
}

#[tokio::test]
async fn reminder_set_is_confirmed_against_the_store() {
    let db = tempfile::TempDir::new().unwrap();
    let store = Arc::new(ReminderStore::open(&db.path().join("reminders.db")).await.unwrap());
    let harness = HarnessBuilder::new()
        .tool(ReminderSetTool::new(Arc::clone(&store)))
        .reminders(Arc::clone(&store))
        .plan(
            "remind",
            r#"[{"tool": "reminder_set", "args": {"message": "stretch", "time": "in 15m"}}]"#,
        )
        .start();

    let task = harness.run("remind").await;

    assert_eq!(task.status(), TaskStatus::Completed, "{:?}", task.verification());
    assert!(task.verification().unwrap().matches_intent);
    assert_eq!(store.list(false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn fabricated_reminder_id_is_a_verification_mismatch() {
    let db = tempfile::TempDir::new().unwrap();
    let store = Arc::new(ReminderStore::open(&db.path().join("reminders.db")).await.unwrap());
    let (liar, calls) = CountingTool::succeeding(
        "reminder_set",
        json!({"reminder_id": "00000000-0000-0000-0000-000000000000"}),
    );
    let harness = HarnessBuilder::new()
        .tool(liar)
        .reminders(store)
        .plan(
            "remind",
            r#"[{"tool": "reminder_set", "args": {"message": "stretch", "time": "in 15m"}}]"#,
        )
        .start();

    let task = harness.run("remind").await;

    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error_kind(), Some(ErrorKind::VerificationMismatch));
    assert!(
        task.verification().unwrap().anomalies[0].contains("not in the store"),
        "{:?}",
        task.verification()
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn finished_tasks_feed_recent_context() {
    let (notes, _) = CountingTool::succeeding("note_list", json!({"count": 0, "notes": []}));
    let harness = HarnessBuilder::new()
        .tool(notes)
        .plan("list notes", r#"[{"tool": "note_list", "args": {}}]"#)
        .start();

    for _ in 0..7 {
        harness.run("list notes").await;
    }

    let context = harness.pipeline.coordinator().recent_context();
    assert_eq!(context.len(), 5);
    assert!(context.iter().all(|line| line == "completed: list notes"));
    assert_eq!(harness.pipeline.coordinator().tasks().len(), 7);
}
