//! The interactive question tool, answered by the host rather than an executor.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::ToolDefinition;

pub const ASK_USER_TOOL: &str = "ask_user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AskUserInput {
    /// The question to show the user
    pub question: String,
    /// Optional suggested answers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Renders a question and waits for the user's answer.
#[async_trait]
pub trait AskUserHandler: Send + Sync {
    async fn ask(&self, input: AskUserInput) -> crate::Result<String>;
}

/// Schema of the `ask_user` tool, available in every mode.
pub fn ask_user_definition() -> ToolDefinition {
    ToolDefinition::object(
        ASK_USER_TOOL,
        "Ask the user a question and wait for their answer. \
         Use when a decision needs the user's input.",
        serde_json::json!({
            "question": {
                "type": "string",
                "description": "The question to show the user"
            },
            "options": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Optional suggested answers"
            }
        }),
        &["question"],
    )
}
