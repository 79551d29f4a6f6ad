#[path = "support/pipeline_harness.rs"]
mod pipeline_harness;

#[path = "pipeline/cancellation.rs"]
mod cancellation;
#[path = "pipeline/properties.rs"]
mod properties;
#[path = "pipeline/scenarios.rs"]
mod scenarios;
