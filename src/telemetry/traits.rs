use super::events::TelemetryEvent;

/// Destination for pipeline telemetry events.
pub trait Observer: Send + Sync {
    /// Record one stage event
    fn record(&self, event: &TelemetryEvent);

    /// Flush buffered output, if any
    fn flush(&self) {}

    fn name(&self) -> &str;
}
