use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{WILDCARD, wildcard_allowed};
use crate::security::ConfirmationError;

/// A remembered approval for a tool on a path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub tool: String,
    pub path_pattern: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PermissionGrant {
    /// Grant on a raw pattern, used as given.
    pub fn new(
        tool: impl Into<String>,
        path_pattern: impl Into<String>,
        granted_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let lifetime = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            tool: tool.into(),
            path_pattern: path_pattern.into(),
            granted_at,
            expires_at: granted_at.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Grant for exactly the confirmed target. Glob metacharacters in the
    /// path are escaped so `/proj/*` stays literal; only `*` itself is kept
    /// as the wildcard.
    pub fn for_target(
        tool: impl Into<String>,
        path: &str,
        granted_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let pattern = if path == WILDCARD {
            WILDCARD.to_owned()
        } else {
            glob::Pattern::escape(path)
        };
        Self::new(tool, pattern, granted_at, ttl)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_wildcard(&self) -> bool {
        self.path_pattern == WILDCARD
    }

    /// Exact match, `*`, or a glob pattern such as `/home/me/project/**`.
    pub fn matches(&self, tool: &str, path: &str) -> bool {
        if self.tool != tool {
            return false;
        }
        if self.is_wildcard() || self.path_pattern == path {
            return true;
        }
        glob::Pattern::new(&self.path_pattern)
            .map(|pattern| pattern.matches(path))
            .unwrap_or(false)
    }

    /// Wildcard grants are only valid for exempt tools.
    pub fn validate(&self) -> Result<(), ConfirmationError> {
        if self.is_wildcard() && !wildcard_allowed(&self.tool) {
            return Err(ConfirmationError::WildcardDenied {
                tool: self.tool.clone(),
            });
        }
        Ok(())
    }
}
