mod engine;
mod types;

pub use engine::RiskEngine;
pub use types::{PolicyTable, RiskAssessment, RiskLevel};
