use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::PermissionGrant;
use crate::Result;

/// Persistence for remembered grants.
#[async_trait::async_trait]
pub trait PermissionStore: Send + Sync {
    /// First active grant covering `tool` on `path`.
    async fn find(&self, tool: &str, path: &str, now: DateTime<Utc>)
    -> Result<Option<PermissionGrant>>;

    /// Replaces any grant with the same tool and pattern.
    async fn save(&self, grant: PermissionGrant) -> Result<()>;

    async fn revoke(&self, tool: &str, path_pattern: &str) -> Result<bool>;

    async fn list(&self) -> Result<Vec<PermissionGrant>>;
}

/// Session-scoped grant store.
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    grants: RwLock<Vec<PermissionGrant>>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn find(
        &self,
        tool: &str,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PermissionGrant>> {
        Ok(self
            .grants
            .read()
            .await
            .iter()
            .find(|g| g.is_active(now) && g.matches(tool, path))
            .cloned())
    }

    async fn save(&self, grant: PermissionGrant) -> Result<()> {
        let mut grants = self.grants.write().await;
        grants.retain(|g| !(g.tool == grant.tool && g.path_pattern == grant.path_pattern));
        grants.push(grant);
        Ok(())
    }

    async fn revoke(&self, tool: &str, path_pattern: &str) -> Result<bool> {
        let mut grants = self.grants.write().await;
        let before = grants.len();
        grants.retain(|g| !(g.tool == tool && g.path_pattern == path_pattern));
        Ok(grants.len() != before)
    }

    async fn list(&self) -> Result<Vec<PermissionGrant>> {
        Ok(self.grants.read().await.clone())
    }
}
