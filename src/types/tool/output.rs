//! Tool execution output types.

/// Output of a tool execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Success(String),
    Error(String),
    Empty,
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Text shown to the model; errors render as their message.
    pub fn text(&self) -> String {
        match self {
            Self::Success(content) => content.clone(),
            Self::Error(message) => message.clone(),
            Self::Empty => String::new(),
        }
    }
}

/// Rich executor result; flattened to a string at the orchestrator boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub output: ToolOutput,
    pub metadata: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            output: ToolOutput::Success(content.into()),
            metadata: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: ToolOutput::Error(message.into()),
            metadata: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            output: ToolOutput::Empty,
            metadata: None,
        }
    }

    /// Attach host-only metadata; it never reaches the model.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_success(&self) -> bool {
        !self.output.is_error()
    }

    pub fn is_error(&self) -> bool {
        self.output.is_error()
    }

    pub fn text(&self) -> String {
        self.output.text()
    }
}

impl From<String> for ToolResult {
    fn from(s: String) -> Self {
        Self::success(s)
    }
}

impl From<&str> for ToolResult {
    fn from(s: &str) -> Self {
        Self::success(s)
    }
}
