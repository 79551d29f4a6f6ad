pub mod schema;

pub use schema::{
    ApprovalMode, Config, NotificationsConfig, ObservabilityConfig, PipelineConfig, PlannerConfig,
    PolicyConfig, RemindersConfig,
};
