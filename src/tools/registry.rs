use super::traits::Tool;
use super::types::ToolSpec;
use std::collections::HashMap;
use std::sync::Arc;

/// Name-keyed set of live tool implementations. The executor is its only
/// caller at run time; planners only see names and specs.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let tool: Arc<dyn Tool> = Arc::from(tool);
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Return sorted list of registered tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Specs sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|tool| tool.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<Box<dyn Tool>> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Box<dyn Tool>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for tool in iter {
            registry.register(tool);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::traits::ExecutionContext;
    use crate::tools::types::ToolResult;
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;

    struct NamedTool(&'static str);

    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }

        fn execute<'a>(
            &'a self,
            _args: serde_json::Value,
            _ctx: &'a ExecutionContext,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
            Box::pin(async move { Ok(ToolResult::ok("done", json!({}))) })
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(NamedTool("file_read")));

        assert!(registry.contains("file_read"));
        assert!(registry.get("file_read").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn names_and_specs_are_sorted() {
        let registry: ToolRegistry = vec![
            Box::new(NamedTool("zeta")) as Box<dyn Tool>,
            Box::new(NamedTool("alpha")),
        ]
        .into_iter()
        .collect();

        assert_eq!(registry.tool_names(), vec!["alpha", "zeta"]);
        assert_eq!(registry.specs()[0].name, "alpha");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(NamedTool("dup")));
        registry.register(Box::new(NamedTool("dup")));
        assert_eq!(registry.len(), 1);
    }
}
