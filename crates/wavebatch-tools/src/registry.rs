use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use wavebatch_core::traits::Tool;

/// Tool definition for listing and documentation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Registry of available tools.
///
/// Built once and handed to an orchestrator; there is no process-wide
/// instance, so differently populated registries can coexist.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::warn!(tool = %name, "Replaced previously registered tool");
        }
    }

    /// Builder-style `register`.
    pub fn with(mut self, tool: impl Tool) -> Self {
        self.register(tool);
        self
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Create a registry with all built-in tools registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // ── Basic (7) ───────────────────────────────────────────
        registry.register(crate::builtin::basic::AddTool);
        registry.register(crate::builtin::basic::SubtractTool);
        registry.register(crate::builtin::basic::MultiplyTool);
        registry.register(crate::builtin::basic::DivideTool);
        registry.register(crate::builtin::basic::PowerTool);
        registry.register(crate::builtin::basic::PercentageTool);
        registry.register(crate::builtin::basic::RoundTool);

        // ── Arrays (4) ──────────────────────────────────────────
        registry.register(crate::builtin::array::SumTool);
        registry.register(crate::builtin::array::MeanTool);
        registry.register(crate::builtin::array::DotProductTool);
        registry.register(crate::builtin::array::ArrayScaleTool);

        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
