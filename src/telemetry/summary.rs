use super::events::{Stage, TelemetryEvent};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageSummary {
    pub count: u64,
    pub successes: u64,
    pub total_ms: u64,
}

impl StageSummary {
    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_ms as f64 / self.count as f64
    }

    pub fn success_rate(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.successes as f64 / self.count as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySummary {
    pub stages: BTreeMap<Stage, StageSummary>,
    pub malformed_lines: u64,
}

impl TelemetrySummary {
    pub fn add(&mut self, event: &TelemetryEvent) {
        let entry = self.stages.entry(event.stage).or_default();
        entry.count += 1;
        entry.total_ms = entry.total_ms.saturating_add(event.duration_ms);
        if event.is_success() {
            entry.successes += 1;
        }
    }
}

/// Aggregate a JSONL telemetry file. A missing file is an empty summary.
pub fn summarize(path: &Path) -> Result<TelemetrySummary> {
    let mut summary = TelemetrySummary::default();
    if !path.exists() {
        return Ok(summary);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read telemetry file {}", path.display()))?;
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        match serde_json::from_str::<TelemetryEvent>(line) {
            Ok(event) => summary.add(&event),
            Err(_) => summary.malformed_lines += 1,
        }
    }
    Ok(summary)
}
