use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;

use taskwarden::ErrorKind;
use taskwarden::error::PipelineError;
use taskwarden::pipeline::TaskStatus;
use taskwarden::security::ConfirmationDecision;

use crate::pipeline_harness::{
    Behavior, CountingTool, HarnessBuilder, ScriptedBroker, eventually, wait_for_status,
};

#[tokio::test]
async fn cancel_while_awaiting_confirmation() {
    let (shell, calls) = CountingTool::succeeding("shell_command", json!({"exit_code": 0}));
    let harness = HarnessBuilder::new()
        .tool(shell)
        .broker(ScriptedBroker::silent())
        .confirmation_timeout(Duration::from_secs(30))
        .plan("list files", r#"[{"tool": "shell_command", "args": {"command": "ls"}}]"#)
        .start();

    let coordinator = Arc::clone(harness.pipeline.coordinator());
    let task_id = coordinator.create_task("list files");
    let driver = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.drive(task_id).await })
    };

    assert!(eventually(wait_for_status(&harness, task_id, TaskStatus::AwaitingConfirmation)).await);
    coordinator.cancel(task_id).unwrap();

    let task = tokio::time::timeout(Duration::from_secs(5), driver)
        .await
        .expect("drive should return promptly after cancel")
        .unwrap()
        .unwrap();
    assert_eq!(task.status(), TaskStatus::Denied);
    assert_eq!(task.error_kind(), Some(ErrorKind::Cancelled));
    assert!(task.results().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let gate = Arc::clone(harness.pipeline.gate());
    assert!(eventually(|| gate.pending().is_empty()).await);

    // Terminal tasks stay terminal.
    assert!(matches!(
        coordinator.cancel(task_id),
        Err(PipelineError::NotCancellable { .. })
    ));
}

#[tokio::test]
async fn running_step_cannot_be_cancelled() {
    let (slow, calls) = CountingTool::with_behavior(
        "note_list",
        Behavior::SleepThenSucceed(Duration::from_millis(300), json!({"count": 0, "notes": []})),
    );
    let harness = HarnessBuilder::new()
        .tool(slow)
        .plan("list notes", r#"[{"tool": "note_list", "args": {}}]"#)
        .start();

    let coordinator = Arc::clone(harness.pipeline.coordinator());
    let task_id = coordinator.create_task("list notes");
    let driver = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.drive(task_id).await })
    };

    assert!(eventually(wait_for_status(&harness, task_id, TaskStatus::Executing)).await);
    let err = coordinator.cancel(task_id).unwrap_err();
    assert!(matches!(err, PipelineError::NotCancellable { .. }));

    let task = driver.await.unwrap().unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancel_unknown_task_is_not_found() {
    let harness = HarnessBuilder::new().start();
    let id = uuid::Uuid::new_v4();
    assert_eq!(
        harness.pipeline.coordinator().cancel(id),
        Err(PipelineError::TaskNotFound(id))
    );
}

#[tokio::test]
async fn tasks_progress_independently() {
    let (shell, shell_calls) = CountingTool::succeeding("shell_command", json!({"exit_code": 0}));
    let (notes, note_calls) = CountingTool::succeeding("note_list", json!({"count": 0, "notes": []}));
    let harness = HarnessBuilder::new()
        .tool(shell)
        .tool(notes)
        .broker(ScriptedBroker::silent())
        .confirmation_timeout(Duration::from_millis(600))
        .plan("risky", r#"[{"tool": "shell_command", "args": {"command": "ls"}}]"#)
        .plan("safe", r#"[{"tool": "note_list", "args": {}}]"#)
        .start();

    let coordinator = Arc::clone(harness.pipeline.coordinator());
    let risky = coordinator.create_task("risky");
    let risky_driver = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.drive(risky).await })
    };
    assert!(eventually(wait_for_status(&harness, risky, TaskStatus::AwaitingConfirmation)).await);

    let safe = coordinator.run("safe").await.unwrap();
    assert_eq!(safe.status(), TaskStatus::Completed);
    assert_eq!(note_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        coordinator.task(risky).unwrap().status(),
        TaskStatus::AwaitingConfirmation
    );

    let risky = risky_driver.await.unwrap().unwrap();
    assert_eq!(risky.status(), TaskStatus::Denied);
    assert_eq!(risky.error_kind(), Some(ErrorKind::ConfirmationExpired));
    assert_eq!(
        risky.confirmations()[0].decision(),
        ConfirmationDecision::Expired
    );
    assert_eq!(shell_calls.load(Ordering::SeqCst), 0);
}
