use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use taskwarden::notifications::{Notification, NotificationChannel};
use taskwarden::reminders::{NewReminder, ReminderDaemon, ReminderStore};

struct CountingChannel {
    name: &'static str,
    calls: AtomicUsize,
    fail: bool,
    delay: Duration,
}

impl CountingChannel {
    fn new(name: &'static str, fail: bool) -> Arc<Self> {
        Self::slow(name, fail, Duration::ZERO)
    }

    fn slow(name: &'static str, fail: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
            fail,
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NotificationChannel for CountingChannel {
    fn name(&self) -> &str {
        self.name
    }

    fn send<'a>(
        &'a self,
        _notification: &'a Notification,
        _target: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("{} is down", self.name);
            }
            Ok(())
        })
    }
}

async fn open_store(tmp: &TempDir) -> Arc<ReminderStore> {
    Arc::new(
        ReminderStore::open(&tmp.path().join("reminders.db"))
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn due_reminder_dispatches_once_per_channel() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let reminder = store
        .add(NewReminder::new(
            "drink water",
            Utc::now() - chrono::Duration::seconds(1),
        ))
        .await
        .unwrap();

    let log = CountingChannel::new("log", false);
    let webhook = CountingChannel::new("webhook", false);
    let daemon = ReminderDaemon::new(
        Arc::clone(&store),
        vec![
            log.clone() as Arc<dyn NotificationChannel>,
            webhook.clone() as Arc<dyn NotificationChannel>,
        ],
        "local",
        Duration::from_secs(2),
    );

    let report = daemon.tick(Utc::now()).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.notified, 1);
    assert_eq!(report.attempts, 2);
    assert_eq!(log.calls(), 1);
    assert_eq!(webhook.calls(), 1);

    let stored = store.get(&reminder.id).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert!(stored.notified_at.is_some());

    let second = daemon.tick(Utc::now()).await.unwrap();
    assert_eq!(second.due, 0);
    assert_eq!(log.calls(), 1);
    assert_eq!(webhook.calls(), 1);

    let events = store.events(&reminder.id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| event.success));
}

#[tokio::test]
async fn concurrent_ticks_do_not_double_dispatch() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    for i in 0..5 {
        store
            .add(NewReminder::new(
                format!("reminder {i}"),
                Utc::now() - chrono::Duration::seconds(1),
            ))
            .await
            .unwrap();
    }

    let channel = CountingChannel::slow("log", false, Duration::from_millis(20));
    let daemon = Arc::new(ReminderDaemon::new(
        Arc::clone(&store),
        vec![channel.clone() as Arc<dyn NotificationChannel>],
        "local",
        Duration::from_secs(2),
    ));

    let ticks: Vec<_> = (0..4)
        .map(|_| {
            let daemon = Arc::clone(&daemon);
            tokio::spawn(async move { daemon.tick(Utc::now()).await.unwrap() })
        })
        .collect();
    let mut notified = 0;
    for tick in ticks {
        notified += tick.await.unwrap().notified;
    }

    assert_eq!(notified, 5);
    assert_eq!(channel.calls(), 5);
    for reminder in store.list(true).await.unwrap() {
        assert!(!reminder.is_active);
        let events = store.events(&reminder.id).await.unwrap();
        assert_eq!(events.iter().filter(|event| event.success).count(), 1);
    }
}

#[tokio::test]
async fn future_reminder_is_left_alone() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let reminder = store
        .add(NewReminder::new(
            "later",
            Utc::now() + chrono::Duration::hours(1),
        ))
        .await
        .unwrap();

    let channel = CountingChannel::new("log", false);
    let daemon = ReminderDaemon::new(
        Arc::clone(&store),
        vec![channel.clone() as Arc<dyn NotificationChannel>],
        "local",
        Duration::from_secs(2),
    );

    let report = daemon.tick(Utc::now()).await.unwrap();
    assert_eq!(report.due, 0);
    assert_eq!(channel.calls(), 0);
    assert!(store.get(&reminder.id).await.unwrap().unwrap().is_active);
}
