//! Tool error types.

use thiserror::Error;

use crate::tools::WorkMode;

/// Failure kinds surfaced by the orchestrator.
///
/// Callers branch on the variant; the model only ever sees
/// [`ToolError::to_model_text`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("{message}")]
    Validation { tool: String, message: String },

    #[error("Tool '{tool}' is not available in {mode} mode")]
    ModeDenied { tool: String, mode: WorkMode },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Error executing tool {tool}: {message}")]
    Execution { tool: String, message: String },
}

impl ToolError {
    pub fn validation(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// The tool exists but is not allowed in `mode`.
    pub fn mode_denied(tool: impl Into<String>, mode: WorkMode) -> Self {
        Self::ModeDenied {
            tool: tool.into(),
            mode,
        }
    }

    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    pub fn execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Name of the tool the error is about.
    pub fn tool_name(&self) -> &str {
        match self {
            Self::Validation { tool, .. }
            | Self::ModeDenied { tool, .. }
            | Self::Execution { tool, .. } => tool,
            Self::UnknownTool { name } => name,
        }
    }

    /// Text placed in the model's tool-result slot.
    pub fn to_model_text(&self) -> String {
        match self {
            Self::UnknownTool { .. } => format!("Error: {}", self),
            _ => self.to_string(),
        }
    }
}
