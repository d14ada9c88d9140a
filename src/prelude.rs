//! Prelude module for convenient imports.
//!
//! ```rust
//! use toolgate::prelude::*;
//! ```

pub use crate::Error;
pub use crate::Result;

// Lifecycle
pub use crate::agent::{AgentContext, Stage, StageEvent, StateManager};

// Tools
pub use crate::tools::{
    AskUserHandler, ExecutionContext, SchemaTool, StreamCallback, Tool, ToolOrchestrator,
    ToolSource, WorkMode,
};
pub use crate::types::{ToolDefinition, ToolError, ToolResult};

// Confirmation
pub use crate::permissions::{MemoryPermissionStore, PermissionGrant, PermissionStore};
pub use crate::security::{
    ConfirmationGate, ConfirmationRequest, ConfirmationResponse, ConfirmationUi, SecurityContext,
};

// Configuration
pub use crate::config::{ConfigBuilder, CoreConfig};
