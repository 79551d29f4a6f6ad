use super::common::{failed_tool_result, required_str};
use super::traits::{ExecutionContext, Tool};
use super::types::ToolResult;
use serde_json::{Value, json};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

const NOTES_DIR: &str = "notes";
const MAX_SLUG_CHARS: usize = 48;

fn notes_dir(ctx: &ExecutionContext) -> PathBuf {
    ctx.workspace_dir.join(NOTES_DIR)
}

/// Lowercase ASCII slug; runs of other characters collapse to one `-`.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let mut slug: String = slug.trim_end_matches('-').chars().take(MAX_SLUG_CHARS).collect();
    if slug.is_empty() {
        slug.push_str("note");
    }
    slug
}

fn render_note(title: &str, tags: &[String], content: &str) -> String {
    let created = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let title = title.replace('\n', " ");
    let mut out = format!("---\ntitle: {title}\ncreated: {created}\n");
    if !tags.is_empty() {
        out.push_str(&format!("tags: [{}]\n", tags.join(", ")));
    }
    out.push_str("---\n\n");
    out.push_str(content);
    if !content.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Title from the front matter, if the file has one.
fn front_matter_title(text: &str) -> Option<String> {
    let body = text.strip_prefix("---\n")?;
    body.lines()
        .take_while(|line| *line != "---")
        .find_map(|line| line.strip_prefix("title:"))
        .map(|title| title.trim().to_string())
}

/// Save a Markdown note under `notes/` in the workspace.
pub struct NoteCreateTool;

impl NoteCreateTool {
    pub const fn new() -> Self {
        Self
    }
}

impl Tool for NoteCreateTool {
    fn name(&self) -> &str {
        "note_create"
    }

    fn description(&self) -> &str {
        "Save a Markdown note with a title and optional tags"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Note title"},
                "content": {"type": "string", "description": "Markdown body"},
                "tags": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional tags"
                }
            },
            "required": ["title", "content"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let title = required_str(&args, "title")?;
            let content = required_str(&args, "content")?;
            if title.trim().is_empty() {
                return Ok(failed_tool_result("Note title must not be empty"));
            }
            let tags: Vec<String> = args
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let dir = notes_dir(ctx);
            tokio::fs::create_dir_all(&dir).await?;

            let short_id = uuid::Uuid::new_v4().simple().to_string();
            let note_id = format!("{}-{}", slugify(title), &short_id[..8]);
            let path = dir.join(format!("{note_id}.md"));

            let rendered = render_note(title, &tags, content);
            if let Err(e) = tokio::fs::write(&path, &rendered).await {
                return Ok(failed_tool_result(format!("Failed to save note: {e}")));
            }

            tracing::debug!(note_id = %note_id, "note saved");
            Ok(ToolResult::ok(
                format!("Note saved to {}", path.display()),
                json!({
                    "note_id": note_id,
                    "path": path.to_string_lossy(),
                    "title": title,
                }),
            ))
        })
    }
}

/// List saved notes, sorted by note id.
pub struct NoteListTool;

impl NoteListTool {
    pub const fn new() -> Self {
        Self
    }
}

async fn read_note_entry(path: &Path) -> Option<Value> {
    let note_id = path.file_stem()?.to_string_lossy().into_owned();
    let text = tokio::fs::read_to_string(path).await.ok()?;
    let title = front_matter_title(&text).unwrap_or_else(|| note_id.clone());
    Some(json!({
        "note_id": note_id,
        "title": title,
        "path": path.to_string_lossy(),
    }))
}

impl Tool for NoteListTool {
    fn name(&self) -> &str {
        "note_list"
    }

    fn description(&self) -> &str {
        "List saved notes"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    fn execute<'a>(
        &'a self,
        _args: Value,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let dir = notes_dir(ctx);
            let mut paths = Vec::new();
            match tokio::fs::read_dir(&dir).await {
                Ok(mut entries) => {
                    while let Some(entry) = entries.next_entry().await? {
                        let path = entry.path();
                        if path.extension().is_some_and(|ext| ext == "md") {
                            paths.push(path);
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Ok(failed_tool_result(format!("Failed to list notes: {e}"))),
            }
            paths.sort();

            let mut notes = Vec::with_capacity(paths.len());
            for path in &paths {
                if let Some(entry) = read_note_entry(path).await {
                    notes.push(entry);
                }
            }

            let output = if notes.is_empty() {
                "No notes saved yet.".to_string()
            } else {
                notes
                    .iter()
                    .map(|n| {
                        format!(
                            "- {} ({})",
                            n["title"].as_str().unwrap_or_default(),
                            n["note_id"].as_str().unwrap_or_default()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            };

            Ok(ToolResult::ok(
                output,
                json!({"count": notes.len(), "notes": notes}),
            ))
        })
    }
}
