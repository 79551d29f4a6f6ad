use super::events::TelemetryEvent;
use super::traits::Observer;
use tracing::info;

/// Writes each event as a structured `tracing` line.
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for LogObserver {
    fn record(&self, event: &TelemetryEvent) {
        let task_id = event.task_id.map(|id| id.to_string()).unwrap_or_default();
        info!(
            stage = %event.stage,
            task_id = %task_id,
            duration_ms = event.duration_ms,
            outcome = %event.outcome,
            detail = event.detail.as_deref().unwrap_or(""),
            "telemetry"
        );
    }

    fn name(&self) -> &str {
        "log"
    }
}
