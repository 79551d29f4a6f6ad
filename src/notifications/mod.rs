//! Notification channels used by the reminder daemon.

pub mod desktop;
pub mod factory;
pub mod log;
pub mod traits;
pub mod webhook;

pub use desktop::DesktopNotifier;
pub use factory::build_channels;
pub use log::LogNotifier;
pub use traits::{Notification, NotificationChannel};
pub use webhook::WebhookNotifier;
