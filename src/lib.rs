//! # toolgate
//!
//! Tool-calling orchestration core for desktop AI assistants.
//!
//! The crate sits between model output and tool execution:
//!
//! - a pure stage machine tracking the agent lifecycle ([`agent`]),
//! - a mode-gated tool registry and orchestrator ([`tools`]),
//! - a signed, single-use confirmation protocol that decides whether an
//!   approval may be persisted as a standing permission grant ([`security`]).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use toolgate::{CoreConfig, ToolOrchestrator, WorkMode};
//! use toolgate::permissions::MemoryPermissionStore;
//! use toolgate::security::{ConfirmationGate, SecurityContext};
//!
//! # async fn example(ui: Arc<dyn toolgate::security::ConfirmationUi>) -> toolgate::Result<()> {
//! let config = CoreConfig::default();
//! let security = Arc::new(SecurityContext::from_config(&config).await?);
//! let gate = Arc::new(ConfirmationGate::new(
//!     security,
//!     Arc::new(MemoryPermissionStore::new()),
//!     ui,
//! ));
//!
//! let orchestrator = ToolOrchestrator::builder(gate)
//!     .builtin_tools(&config)
//!     .mode(WorkMode::Cowork)
//!     .build();
//! orchestrator.start(&config);
//!
//! let text = orchestrator
//!     .execute_tool("run_command", serde_json::json!({"command": "ls"}), None)
//!     .await;
//! println!("{text}");
//! orchestrator.shutdown();
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod agent;
pub mod config;
pub mod mcp;
pub mod observability;
pub mod permissions;
pub mod prelude;
pub mod security;
pub mod skills;
pub mod tools;
pub mod types;

pub use agent::{
    AgentContext, DEFAULT_HISTORY_CAP, DEFAULT_MAX_ITERATIONS, Stage, StageEvent, StateChange,
    StateManager, ToolResultRecord, reduce,
};
pub use config::{ConfigBuilder, ConfigError, ConfigProvider, CoreConfig};
pub use permissions::{MemoryPermissionStore, PermissionGrant, PermissionStore};
pub use security::{
    AuditAction, AuditEntry, Clock, ConfirmationError, ConfirmationGate, ConfirmationRequest,
    ConfirmationResponse, ManualClock, SecurityContext, SystemClock,
};
pub use tools::{
    ExecutionContext, SchemaTool, Tool, ToolOrchestrator, ToolOrchestratorBuilder, ToolRegistry,
    ToolSource, WorkMode,
};
pub use types::{
    ContentBlock, Message, Role, ToolDefinition, ToolError, ToolOutput, ToolResult,
    ToolResultBlock, ToolUseBlock,
};

/// Error type for toolgate operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Tool resolution, gating, validation or execution failed.
    #[error(transparent)]
    Tool(#[from] types::ToolError),

    /// Confirmation token issuance or verification failed.
    #[error(transparent)]
    Confirmation(#[from] security::ConfirmationError),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// MCP server communication failed.
    #[error("MCP error: {0}")]
    Mcp(String),

    /// Skill lookup or parsing failed.
    #[error("Skill error: {0}")]
    Skill(String),

    /// Subprocess could not be spawned or awaited.
    #[error("Process error: {0}")]
    Process(String),

    /// Operation blocked by a permission rule.
    #[error("Permission denied: {0}")]
    Permission(String),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Permission, confirmation or mode-gating failures
    Authorization,
    /// Configuration, parsing, or setup errors
    Configuration,
    /// Bad input supplied by the model
    Input,
    /// Failures raised by external collaborators (MCP servers, subprocesses)
    External,
    /// Internal errors (IO, JSON, unexpected states)
    Internal,
}

impl Error {
    /// Configuration error with a free-form message.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Coarse category used by hosts to pick a reaction.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Permission(_) | Error::Confirmation(_) => ErrorCategory::Authorization,
            Error::Tool(types::ToolError::ModeDenied { .. }) => ErrorCategory::Authorization,
            Error::Tool(types::ToolError::Validation { .. })
            | Error::Tool(types::ToolError::UnknownTool { .. }) => ErrorCategory::Input,
            Error::Tool(_) | Error::Mcp(_) | Error::Process(_) => ErrorCategory::External,
            Error::Config(_) | Error::Skill(_) => ErrorCategory::Configuration,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_authorization_error(&self) -> bool {
        self.category() == ErrorCategory::Authorization
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound { key } => {
                Error::Config(format!("Key not found: {}", key))
            }
            config::ConfigError::InvalidValue { key, message } => {
                Error::Config(format!("Invalid value for {}: {}", key, message))
            }
            config::ConfigError::Serialization(e) => Error::Json(e),
            config::ConfigError::Io(e) => Error::Io(e),
            config::ConfigError::Env(e) => Error::Config(e.to_string()),
            config::ConfigError::Provider { message } => Error::Config(message),
        }
    }
}

impl From<mcp::McpError> for Error {
    fn from(err: mcp::McpError) -> Self {
        match err {
            mcp::McpError::Json(e) => Error::Json(e),
            _ => Error::Mcp(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
