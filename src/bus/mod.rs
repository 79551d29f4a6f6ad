//! In-process publish/subscribe and request/response routing.
//!
//! Every subscriber owns an unbounded queue drained by its own worker task,
//! so messages from one publisher reach a subscriber in send order and a slow
//! or failing handler never blocks delivery to the others. Handler calls run
//! in their own task, which turns both `Err` returns and panics into log
//! lines instead of bus failures.

mod envelope;

pub use envelope::Envelope;

use crate::error::BusError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Handle returned by [`MessageBus::subscribe`]; pass it to `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    topic: String,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

struct SubscriberSlot<M> {
    id: u64,
    tx: mpsc::UnboundedSender<Envelope<M>>,
}

struct BusInner<M> {
    subscribers: Mutex<HashMap<String, Vec<SubscriberSlot<M>>>>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Envelope<M>>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// Typed in-memory message bus. Cloning yields another handle to the same bus.
pub struct MessageBus<M> {
    inner: Arc<BusInner<M>>,
}

impl<M> Clone for MessageBus<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> Default for MessageBus<M>
where
    M: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> MessageBus<M>
where
    M: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register `handler` for `topic`. Must be called inside a Tokio runtime.
    pub fn subscribe<F, Fut>(&self, topic: &str, name: &str, handler: F) -> Subscription
    where
        F: Fn(Envelope<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope<M>>();
        let worker_name = name.to_string();

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let topic = envelope.topic.clone();
                match tokio::spawn(handler(envelope)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(subscriber = %worker_name, topic = %topic, "bus handler failed: {e:#}");
                    }
                    Err(join) => {
                        tracing::error!(subscriber = %worker_name, topic = %topic, "bus handler panicked: {join}");
                    }
                }
            }
            tracing::debug!(subscriber = %worker_name, "bus subscriber stopped");
        });

        if self.inner.closed.load(Ordering::Acquire) {
            // Dropping `tx` here ends the worker immediately.
            return Subscription {
                id,
                topic: topic.to_string(),
            };
        }

        self.subscribers()
            .entry(topic.to_string())
            .or_default()
            .push(SubscriberSlot { id, tx });

        Subscription {
            id,
            topic: topic.to_string(),
        }
    }

    /// Remove a subscriber. Returns whether it was still registered.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut subscribers = self.subscribers();
        let Some(slots) = subscribers.get_mut(&subscription.topic) else {
            return false;
        };
        let before = slots.len();
        slots.retain(|slot| slot.id != subscription.id);
        let removed = slots.len() != before;
        if slots.is_empty() {
            subscribers.remove(&subscription.topic);
        }
        removed
    }

    /// Fire-and-forget delivery. Returns the number of subscribers reached.
    pub fn publish(&self, topic: &str, sender: &str, payload: M) -> usize {
        self.deliver(Envelope::new(topic, sender, payload))
    }

    /// Send a request and wait for exactly one correlated reply.
    pub async fn request(
        &self,
        topic: &str,
        sender: &str,
        payload: M,
        timeout: Duration,
    ) -> Result<Envelope<M>, BusError> {
        let (correlation_id, rx) = self.send_request(topic, sender, payload)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::Closed),
            Err(_) => {
                self.pending().remove(&correlation_id);
                Err(BusError::Timeout {
                    topic: topic.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Like [`request`](Self::request) without a deadline: waits until the
    /// responder replies or the bus shuts down. Only for responders that
    /// always answer.
    pub async fn request_unbounded(
        &self,
        topic: &str,
        sender: &str,
        payload: M,
    ) -> Result<Envelope<M>, BusError> {
        let (_, rx) = self.send_request(topic, sender, payload)?;
        rx.await.map_err(|_| BusError::Closed)
    }

    fn send_request(
        &self,
        topic: &str,
        sender: &str,
        payload: M,
    ) -> Result<(Uuid, oneshot::Receiver<Envelope<M>>), BusError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        let correlation_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending().insert(correlation_id, tx);

        let envelope = Envelope::new(topic, sender, payload).with_correlation(correlation_id);
        if self.deliver(envelope) == 0 {
            self.pending().remove(&correlation_id);
            return Err(BusError::NoResponder {
                topic: topic.to_string(),
            });
        }
        Ok((correlation_id, rx))
    }

    /// Answer `request`. Only the first reply for a correlation id is delivered.
    pub fn reply(&self, request: &Envelope<M>, sender: &str, payload: M) -> bool {
        let Some(correlation_id) = request.correlation_id else {
            tracing::warn!(topic = %request.topic, "reply to a message that is not a request");
            return false;
        };
        let Some(waiter) = self.pending().remove(&correlation_id) else {
            tracing::debug!(topic = %request.topic, %correlation_id, "late or duplicate reply dropped");
            return false;
        };
        let envelope = Envelope::new(request.topic.clone(), sender, payload)
            .with_correlation(correlation_id);
        waiter.send(envelope).is_ok()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers().get(topic).map_or(0, Vec::len)
    }

    /// Drop every subscriber and fail all in-flight requests with `Closed`.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.subscribers().clear();
        self.pending().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn deliver(&self, envelope: Envelope<M>) -> usize {
        if self.inner.closed.load(Ordering::Acquire) {
            return 0;
        }
        let mut subscribers = self.subscribers();
        let Some(slots) = subscribers.get_mut(&envelope.topic) else {
            return 0;
        };
        slots.retain(|slot| !slot.tx.is_closed());
        for slot in slots.iter() {
            let _ = slot.tx.send(envelope.clone());
        }
        slots.len()
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<String, Vec<SubscriberSlot<M>>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<Uuid, oneshot::Sender<Envelope<M>>>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
