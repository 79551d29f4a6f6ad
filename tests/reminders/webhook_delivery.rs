use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use taskwarden::notifications::{LogNotifier, NotificationChannel, WebhookNotifier};
use taskwarden::reminders::{NewReminder, Priority, ReminderDaemon, ReminderStore};

async fn daemon_with_webhook(tmp: &TempDir, url: String) -> (Arc<ReminderStore>, ReminderDaemon) {
    let store = Arc::new(
        ReminderStore::open(&tmp.path().join("reminders.db"))
            .await
            .unwrap(),
    );
    let channels: Vec<Arc<dyn NotificationChannel>> = vec![
        Arc::new(LogNotifier),
        Arc::new(WebhookNotifier::with_timeout(url, 2)),
    ];
    let daemon = ReminderDaemon::new(
        Arc::clone(&store),
        channels,
        "ops-room",
        Duration::from_secs(3),
    );
    (store, daemon)
}

#[tokio::test]
async fn webhook_receives_due_reminder_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/remind"))
        .and(body_partial_json(json!({
            "message": "stand-up in five",
            "priority": "high",
            "target": "ops-room",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let (store, daemon) = daemon_with_webhook(&tmp, format!("{}/remind", server.uri())).await;
    let reminder = store
        .add(
            NewReminder::new("stand-up in five", Utc::now() - chrono::Duration::seconds(1))
                .with_priority(Priority::High),
        )
        .await
        .unwrap();

    let first = daemon.tick(Utc::now()).await.unwrap();
    assert_eq!(first.notified, 1);
    assert_eq!(first.failures, 0);
    let second = daemon.tick(Utc::now()).await.unwrap();
    assert_eq!(second.due, 0);

    let channels = store.succeeded_channels(&reminder.id).await.unwrap();
    assert!(channels.contains("log"));
    assert!(channels.contains("webhook"));
    server.verify().await;
}

#[tokio::test]
async fn webhook_failure_is_recorded_alongside_log_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let (store, daemon) = daemon_with_webhook(&tmp, server.uri()).await;
    let reminder = store
        .add(NewReminder::new(
            "renew certificate",
            Utc::now() - chrono::Duration::seconds(1),
        ))
        .await
        .unwrap();

    let report = daemon.tick(Utc::now()).await.unwrap();
    assert_eq!(report.attempts, 2);
    assert_eq!(report.failures, 1);

    let stored = store.get(&reminder.id).await.unwrap().unwrap();
    assert!(!stored.is_active);

    let events = store.events(&reminder.id).await.unwrap();
    let webhook = events.iter().find(|e| e.channel == "webhook").unwrap();
    assert!(!webhook.success);
    assert!(webhook.error.as_deref().unwrap().contains("503"));
    let log = events.iter().find(|e| e.channel == "log").unwrap();
    assert!(log.success);
}
