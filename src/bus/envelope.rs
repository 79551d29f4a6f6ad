use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A message in flight on the bus, with routing metadata.
#[derive(Debug, Clone)]
pub struct Envelope<M> {
    pub id: Uuid,
    pub topic: String,
    pub sender: String,
    /// Set on requests and on the single reply that answers them.
    pub correlation_id: Option<Uuid>,
    pub payload: M,
    pub sent_at: DateTime<Utc>,
}

impl<M> Envelope<M> {
    pub fn new(topic: impl Into<String>, sender: impl Into<String>, payload: M) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            sender: sender.into(),
            correlation_id: None,
            payload,
            sent_at: Utc::now(),
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}
