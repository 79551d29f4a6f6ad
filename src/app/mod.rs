pub mod dispatch;
pub mod render;
pub mod runtime;
