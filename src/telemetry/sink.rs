use super::traits::Observer;
use crate::bus::Subscription;
use crate::pipeline::messages::{PipelineBus, PipelineMessage, TOPIC_TELEMETRY};
use std::sync::Arc;

/// Bus subscriber that forwards telemetry events to an observer.
pub struct TelemetrySink;

impl TelemetrySink {
    pub fn attach(bus: &PipelineBus, observer: Arc<dyn Observer>) -> Subscription {
        bus.subscribe(TOPIC_TELEMETRY, "telemetry", move |envelope| {
            let observer = Arc::clone(&observer);
            async move {
                if let PipelineMessage::Telemetry(event) = &envelope.payload {
                    observer.record(event);
                }
                Ok(())
            }
        })
    }
}
