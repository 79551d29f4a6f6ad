use super::events::TelemetryEvent;
use super::traits::Observer;

/// Observer that discards every event.
pub struct NoopObserver;

impl Observer for NoopObserver {
    #[inline(always)]
    fn record(&self, _event: &TelemetryEvent) {}

    fn name(&self) -> &str {
        "noop"
    }
}
