//! Tool trait definitions.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use super::context::ExecutionContext;
use super::mode::WorkMode;
use crate::types::{ToolDefinition, ToolError, ToolResult};

/// Modes a tool is available in unless it says otherwise.
pub const DEFAULT_MODES: &[WorkMode] = &[WorkMode::Code, WorkMode::Cowork];

/// Core tool trait for all executors.
///
/// Returning `Err` (or panicking) is reported to the model as
/// `Error executing tool <name>: <message>`; it never escapes the orchestrator.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;

    fn modes(&self) -> &[WorkMode] {
        DEFAULT_MODES
    }

    fn allowed_in(&self, mode: WorkMode) -> bool {
        self.modes().contains(&mode)
    }

    /// Checked before execution; `Err` is returned to the model verbatim.
    fn validate(&self, _input: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        context: &ExecutionContext,
    ) -> crate::Result<ToolResult>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

/// Schema-based tool trait with automatic JSON schema generation.
///
/// Provides a higher-level abstraction over `Tool` with typed inputs
/// and automatic schema derivation via schemars.
#[async_trait]
pub trait SchemaTool: Send + Sync {
    type Input: JsonSchema + DeserializeOwned + Send;
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    const MODES: &'static [WorkMode] = DEFAULT_MODES;

    async fn handle(
        &self,
        input: Self::Input,
        context: &ExecutionContext,
    ) -> crate::Result<ToolResult>;

    /// Semantic checks beyond what the schema expresses.
    fn check(_input: &Self::Input) -> Result<(), String> {
        Ok(())
    }

    fn input_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(Self::Input);
        let mut value =
            serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));

        if let Some(obj) = value.as_object_mut() {
            obj.remove("$schema");
            obj.remove("title");
        }

        value
    }
}

fn parse<T: SchemaTool>(input: serde_json::Value) -> Result<T::Input, String> {
    serde_json::from_value::<T::Input>(input).map_err(|e| format!("Invalid input: {}", e))
}

#[async_trait]
impl<T: SchemaTool + 'static> Tool for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn description(&self) -> &str {
        T::DESCRIPTION
    }

    fn input_schema(&self) -> serde_json::Value {
        T::input_schema()
    }

    fn modes(&self) -> &[WorkMode] {
        T::MODES
    }

    fn validate(&self, input: &serde_json::Value) -> Result<(), String> {
        let typed = parse::<T>(input.clone())?;
        T::check(&typed)
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        context: &ExecutionContext,
    ) -> crate::Result<ToolResult> {
        let typed = parse::<T>(input).map_err(|message| ToolError::validation(T::NAME, message))?;
        SchemaTool::handle(self, typed, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct EchoInput {
        /// Text to echo back
        text: String,
    }

    struct EchoTool;

    #[async_trait]
    impl SchemaTool for EchoTool {
        type Input = EchoInput;
        const NAME: &'static str = "echo";
        const DESCRIPTION: &'static str = "Echo text";
        const MODES: &'static [WorkMode] = WorkMode::ALL;

        async fn handle(
            &self,
            input: EchoInput,
            _context: &ExecutionContext,
        ) -> crate::Result<ToolResult> {
            Ok(ToolResult::success(input.text))
        }

        fn check(input: &EchoInput) -> Result<(), String> {
            if input.text.is_empty() {
                return Err("text must not be empty".into());
            }
            Ok(())
        }
    }

    #[test]
    fn test_schema_definition() {
        let def = EchoTool.definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.input_schema["type"], "object");
        assert!(def.input_schema["properties"]["text"].is_object());
        assert_eq!(def.input_schema["required"][0], "text");
        assert!(def.input_schema.get("$schema").is_none());
    }

    #[test]
    fn test_validate() {
        assert!(EchoTool.validate(&serde_json::json!({"text": "hi"})).is_ok());
        assert!(
            EchoTool
                .validate(&serde_json::json!({}))
                .unwrap_err()
                .starts_with("Invalid input")
        );
        assert_eq!(
            EchoTool.validate(&serde_json::json!({"text": ""})),
            Err("text must not be empty".to_string())
        );
    }

    #[tokio::test]
    async fn test_execute() {
        let context = ExecutionContext::new("echo", WorkMode::Chat);
        let result = EchoTool
            .execute(serde_json::json!({"text": "hello"}), &context)
            .await
            .unwrap();
        assert_eq!(result.text(), "hello");
        assert!(EchoTool.allowed_in(WorkMode::Chat));
    }
}
