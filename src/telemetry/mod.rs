pub mod events;
pub mod jsonl;
pub mod log;
pub mod multi;
pub mod noop;
pub mod sink;
pub mod summary;
pub mod traits;

pub use self::log::LogObserver;
pub use events::{Outcome, Stage, TelemetryEvent};
pub use jsonl::JsonlObserver;
pub use multi::MultiObserver;
pub use noop::NoopObserver;
pub use sink::TelemetrySink;
pub use summary::{StageSummary, TelemetrySummary, summarize};
pub use traits::Observer;

use crate::config::ObservabilityConfig;
use std::path::Path;
use std::sync::Arc;

/// Factory: create the right observer from config.
///
/// `jsonl_path` is only opened for the jsonl backends. If it cannot be
/// opened the factory degrades to the log observer.
pub fn create_observer(config: &ObservabilityConfig, jsonl_path: &Path) -> Arc<dyn Observer> {
    match config.backend.as_str() {
        "log" => Arc::new(LogObserver::new()),
        "jsonl" => jsonl_or_log(jsonl_path),
        "log+jsonl" => Arc::new(MultiObserver::new(vec![
            Arc::new(LogObserver::new()),
            jsonl_or_log(jsonl_path),
        ])),
        "none" | "noop" => Arc::new(NoopObserver),
        _ => {
            tracing::warn!(
                "Unknown observability backend '{}', falling back to noop",
                config.backend
            );
            Arc::new(NoopObserver)
        }
    }
}

fn jsonl_or_log(path: &Path) -> Arc<dyn Observer> {
    match JsonlObserver::open(path) {
        Ok(observer) => Arc::new(observer),
        Err(e) => {
            tracing::warn!("{e:#}; telemetry falls back to log");
            Arc::new(LogObserver::new())
        }
    }
}
