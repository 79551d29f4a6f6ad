use super::{
    FileReadTool, FileWriteTool, NoteCreateTool, NoteListTool, ReminderListTool, ReminderSetTool,
    ShellTool, Tool, ToolRegistry,
};
use crate::reminders::ReminderStore;
use std::sync::Arc;

/// The built-in tool set. Reminder tools write through the shared store.
pub fn default_tools(reminders: &Arc<ReminderStore>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(FileReadTool::new()),
        Box::new(FileWriteTool::new()),
        Box::new(ShellTool::new()),
        Box::new(NoteCreateTool::new()),
        Box::new(NoteListTool::new()),
        Box::new(ReminderSetTool::new(Arc::clone(reminders))),
        Box::new(ReminderListTool::new(Arc::clone(reminders))),
    ]
}

pub fn default_registry(reminders: &Arc<ReminderStore>) -> ToolRegistry {
    default_tools(reminders).into_iter().collect()
}
