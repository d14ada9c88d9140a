//! Confirmation protocol errors.

use thiserror::Error;

/// Failures of the confirmation protocol.
///
/// Only [`ConfirmationError::AgentUnavailable`] affects the approved/denied
/// action itself; every other variant merely prevents a grant from being
/// remembered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmationError {
    #[error("Unknown or already resolved confirmation id")]
    InvalidId,

    #[error("Confirmation token does not match")]
    TokenMismatch,

    #[error("Confirmation token has expired")]
    Expired,

    #[error("Confirmation token is missing")]
    MissingToken,

    #[error("Wildcard permission is not allowed for path-sensitive tool {tool}")]
    WildcardDenied { tool: String },

    #[error("No agent is waiting for this confirmation")]
    AgentUnavailable,

    #[error("Permission store error: {message}")]
    Storage { message: String },

    #[error("Confirmation secret unavailable: {message}")]
    Secret { message: String },
}

impl ConfirmationError {
    pub fn blocks_action(&self) -> bool {
        matches!(self, Self::AgentUnavailable)
    }

    /// Stable snake_case identifier used in audit entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidId => "invalid_id",
            Self::TokenMismatch => "token_mismatch",
            Self::Expired => "expired",
            Self::MissingToken => "missing_token",
            Self::WildcardDenied { .. } => "wildcard_denied",
            Self::AgentUnavailable => "agent_unavailable",
            Self::Storage { .. } => "storage",
            Self::Secret { .. } => "secret",
        }
    }
}
