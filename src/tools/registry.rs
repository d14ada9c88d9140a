//! Registry of statically known executors.

use std::collections::HashMap;
use std::sync::Arc;

use super::command::RunCommandTool;
use super::mode::WorkMode;
use super::traits::Tool;
use super::write::WriteFileTool;
use crate::config::CoreConfig;
use crate::types::ToolDefinition;

/// Static executors keyed by tool name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `run_command` and `write_file`, configured from `config`.
    pub fn builtin(config: &CoreConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RunCommandTool::from_config(config)));
        registry.register(Arc::new(WriteFileTool));
        registry
    }

    /// Replaces any executor with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Entries from `other` win on name clashes.
    pub fn merge(&mut self, other: ToolRegistry) {
        self.tools.extend(other.tools);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions of every executor allowed in `mode`, sorted by name.
    pub fn definitions_for(&self, mode: WorkMode) -> Vec<ToolDefinition> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .filter(|t| t.allowed_in(mode))
            .map(|t| t.definition())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin() {
        let registry = ToolRegistry::builtin(&CoreConfig::default());
        assert_eq!(registry.names(), vec!["run_command", "write_file"]);
        assert!(registry.contains("write_file"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_definitions_filtered_by_mode() {
        let registry = ToolRegistry::builtin(&CoreConfig::default());
        assert!(registry.definitions_for(WorkMode::Chat).is_empty());

        let names: Vec<_> = registry
            .definitions_for(WorkMode::Cowork)
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["run_command", "write_file"]);
    }
}
