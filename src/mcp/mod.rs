//! MCP (Model Context Protocol) tools exposed as `mcp__<server>__<tool>`.
//!
//! Transports are out of scope: each server is reached through an
//! [`McpClient`] supplied by the host.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tools::{ExecutionContext, ToolSource};
use crate::types::{ToolDefinition, ToolResult};

const MCP_TOOL_PREFIX: &str = "mcp__";

/// Parse MCP qualified name (mcp__server__tool) into (server, tool)
pub fn parse_mcp_name(name: &str) -> Option<(&str, &str)> {
    name.strip_prefix(MCP_TOOL_PREFIX)?
        .split_once("__")
        .filter(|(server, tool)| !server.is_empty() && !tool.is_empty())
}

/// Create MCP qualified name from server and tool names
pub fn make_mcp_name(server: &str, tool: &str) -> String {
    format!("{}{server}__{tool}", MCP_TOOL_PREFIX)
}

/// Check whether a tool name is a qualified MCP name
pub fn is_mcp_name(name: &str) -> bool {
    parse_mcp_name(name).is_some()
}

/// Tool as listed by an MCP server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Server not found: {name}")]
    ServerNotFound { name: String },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type McpResult<T> = std::result::Result<T, McpError>;

/// Result of an MCP `tools/call`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolResult {
    pub content: Vec<McpContent>,
    #[serde(default)]
    pub is_error: bool,
}

/// One content block of an MCP result.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        uri: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default, rename = "mimeType")]
        mime_type: Option<String>,
    },
}

impl McpContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            McpContent::Text { text } => Some(text),
            McpContent::Resource {
                text: Some(text), ..
            } => Some(text),
            _ => None,
        }
    }
}

impl McpToolResult {
    /// Text blocks joined by newlines; binary content becomes a placeholder.
    pub fn to_string_content(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                McpContent::Image { mime_type, .. } => format!("[image: {}]", mime_type),
                McpContent::Resource {
                    uri, text: None, ..
                } => format!("[resource: {}]", uri),
                other => other.as_text().unwrap_or_default().to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One connected MCP server.
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn list_tools(&self) -> McpResult<Vec<McpToolDefinition>>;

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> McpResult<McpToolResult>;
}

/// Every tool of every registered server.
#[derive(Default, Clone)]
pub struct McpToolSource {
    servers: BTreeMap<String, Arc<dyn McpClient>>,
}

impl McpToolSource {
    /// Create a source with no servers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server; its tools appear as `mcp__<name>__<tool>`.
    pub fn server(mut self, name: impl Into<String>, client: Arc<dyn McpClient>) -> Self {
        self.servers.insert(name.into(), client);
        self
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl ToolSource for McpToolSource {
    fn name(&self) -> &str {
        "mcp"
    }

    fn claims(&self, tool_name: &str) -> bool {
        is_mcp_name(tool_name)
    }

    async fn load(&self) -> crate::Result<Vec<ToolDefinition>> {
        let mut definitions = Vec::new();
        for (server, client) in &self.servers {
            let tools = client.list_tools().await?;
            tracing::debug!(server = %server, count = tools.len(), "listed MCP tools");
            definitions.extend(tools.into_iter().map(|tool| {
                ToolDefinition::new(
                    make_mcp_name(server, &tool.name),
                    tool.description,
                    tool.input_schema,
                )
            }));
        }
        Ok(definitions)
    }

    async fn call(
        &self,
        tool_name: &str,
        input: serde_json::Value,
        _context: &ExecutionContext,
    ) -> crate::Result<ToolResult> {
        let (server, tool) = parse_mcp_name(tool_name).ok_or_else(|| McpError::ToolNotFound {
            name: tool_name.to_string(),
        })?;
        let client = self
            .servers
            .get(server)
            .ok_or_else(|| McpError::ServerNotFound {
                name: server.to_string(),
            })?;

        let result = client.call_tool(tool, input).await?;
        let text = result.to_string_content();
        Ok(if result.is_error {
            ToolResult::error(text)
        } else {
            ToolResult::success(text)
        })
    }
}

impl std::fmt::Debug for McpToolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpToolSource")
            .field("servers", &self.server_names())
            .finish()
    }
}
