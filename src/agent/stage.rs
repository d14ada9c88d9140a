//! Agent lifecycle stages and the pure reducer that drives them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Lifecycle stage of the agent loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    Idle,
    Thinking,
    Planning,
    Executing,
    Feedback,
    Error,
}

impl Stage {
    /// True only in PLANNING and EXECUTING.
    pub fn can_execute_tools(&self) -> bool {
        matches!(self, Self::Planning | Self::Executing)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Wire name, e.g. `"thinking"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Feedback => "feedback",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle events accepted by [`reduce`].
///
/// Tags the front end does not know about deserialize to `Unknown`, which the
/// reducer ignores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageEvent {
    StartProcessing,
    ToolCall {
        name: String,
        id: String,
    },
    ToolComplete {
        result: String,
    },
    ToolError {
        message: String,
    },
    MessageComplete {
        content: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
    Retry,
    Complete,
    #[serde(other)]
    Unknown,
}

/// A tool result keyed by the `tool_use` id it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub tool_use_id: String,
    pub content: String,
}

/// Snapshot of the agent lifecycle.
///
/// Every field except `history`/`history_size` changes only through
/// [`reduce`]; the history is written by the state manager directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub stage: Stage,
    pub iteration: u32,
    pub is_processing: bool,
    pub history: Arc<[Message]>,
    pub history_size: usize,
    pub current_tool: Option<String>,
    pub current_tool_use_id: Option<String>,
    pub tool_results: Vec<ToolResultRecord>,
    pub error: Option<String>,
    pub error_status: Option<u16>,
    pub retry_count: u32,
    pub last_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Apply one event to a context, producing the next context.
///
/// Pure: the timestamp is an argument, nothing is read from the environment,
/// and `context` is never modified.
pub fn reduce(context: &AgentContext, event: &StageEvent, at: DateTime<Utc>) -> AgentContext {
    let mut next = context.clone();

    match event {
        StageEvent::StartProcessing => {
            next.stage = Stage::Thinking;
            next.iteration = next.iteration.saturating_add(1);
            next.is_processing = true;
            next.error = None;
            next.error_status = None;
            if next.started_at.is_none() {
                next.started_at = Some(at);
            }
        }
        StageEvent::ToolCall { name, id } => {
            next.stage = Stage::Planning;
            next.current_tool = Some(name.clone());
            next.current_tool_use_id = Some(id.clone());
        }
        StageEvent::ToolComplete { result } => {
            next.stage = Stage::Executing;
            next.tool_results.push(ToolResultRecord {
                tool_use_id: next.current_tool_use_id.clone().unwrap_or_default(),
                content: result.clone(),
            });
        }
        StageEvent::ToolError { message } => {
            next.stage = Stage::Thinking;
            next.current_tool = None;
            next.current_tool_use_id = None;
            next.error = Some(message.clone());
        }
        StageEvent::MessageComplete { content } => {
            next.stage = Stage::Feedback;
            next.tool_results.clear();
            next.last_message = Some(content.clone());
        }
        StageEvent::Error { message, status } => {
            next.stage = Stage::Error;
            next.is_processing = false;
            next.error = Some(message.clone());
            next.error_status = *status;
        }
        StageEvent::Retry => {
            next.stage = Stage::Thinking;
            next.retry_count = next.retry_count.saturating_add(1);
            next.is_processing = true;
            next.error = None;
            next.error_status = None;
        }
        StageEvent::Complete => {
            // Ends the run; the next START_PROCESSING opens a fresh one.
            next.stage = Stage::Idle;
            next.is_processing = false;
            next.current_tool = None;
            next.current_tool_use_id = None;
            next.tool_results.clear();
            next.iteration = 0;
            next.retry_count = 0;
            next.started_at = None;
        }
        StageEvent::Unknown => return next,
    }

    next.updated_at = Some(at);
    next
}
