//! Tool call and tool result blocks exchanged with the model.

use serde::{Deserialize, Serialize};

use super::ToolError;

/// A block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_use(&self) -> Option<&ToolUseBlock> {
        match self {
            Self::ToolUse(call) => Some(call),
            _ => None,
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// The answer to a [`ToolUseBlock`], always plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResultBlock {
    /// Flatten a dispatch outcome. Failures carry their model-facing text
    /// and set `is_error`.
    pub fn from_dispatch(tool_use_id: impl Into<String>, outcome: Result<String, ToolError>) -> Self {
        let (content, is_error) = match outcome {
            Ok(text) => (text, false),
            Err(e) => (e.to_model_text(), true),
        };
        Self {
            tool_use_id: tool_use_id.into(),
            content,
            is_error,
        }
    }
}
