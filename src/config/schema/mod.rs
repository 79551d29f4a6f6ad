mod env_overrides;
mod loader;
mod notifications;
mod observability;
mod pipeline;
mod policy;
mod reminders;
#[cfg(test)]
mod test_env;
mod types;

pub use notifications::NotificationsConfig;
pub use observability::ObservabilityConfig;
pub use pipeline::{ApprovalMode, PipelineConfig, PlannerConfig};
pub use policy::PolicyConfig;
pub use reminders::RemindersConfig;
pub use types::Config;
