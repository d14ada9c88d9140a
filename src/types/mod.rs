//! Shared message and tool types.

mod content;
mod message;
pub mod tool;

pub use content::{ContentBlock, ToolResultBlock, ToolUseBlock};
pub use message::{Message, Role};
pub use tool::{ToolDefinition, ToolError, ToolOutput, ToolResult};
