pub mod common;
pub mod factory;
pub mod file_read;
pub mod file_write;
pub mod notes;
pub mod registry;
pub mod reminders;
pub mod schema;
pub mod shell;
pub mod traits;
pub mod types;

pub use factory::{default_registry, default_tools};
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use notes::{NoteCreateTool, NoteListTool};
pub use registry::ToolRegistry;
pub use reminders::{ReminderListTool, ReminderSetTool};
pub use shell::ShellTool;
pub use traits::{ExecutionContext, Tool};
pub use types::{ToolKind, ToolResult, ToolSpec};
