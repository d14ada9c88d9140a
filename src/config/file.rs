//! JSON file configuration provider.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;

use super::ConfigResult;
use super::provider::ConfigProvider;

/// Reads a flat (or dot-nested) JSON object; missing files read as empty.
pub struct FileConfigProvider {
    path: PathBuf,
    data: RwLock<Option<HashMap<String, serde_json::Value>>>,
}

impl FileConfigProvider {
    /// Provider for a JSON file; nothing is read until [`reload`](Self::reload) or first access.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ConfigResult<HashMap<String, serde_json::Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_loaded(&self) -> ConfigResult<()> {
        let mut data = self.data.write().await;
        if data.is_none() {
            *data = Some(self.load().await?);
        }
        Ok(())
    }

    /// Read the file again. A missing file yields an empty provider.
    pub async fn reload(&self) -> ConfigResult<()> {
        let fresh = self.load().await?;
        *self.data.write().await = Some(fresh);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConfigProvider for FileConfigProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        self.ensure_loaded().await?;

        let data = self.data.read().await;
        let Some(map) = data.as_ref() else {
            return Ok(None);
        };

        let mut parts = key.split('.');
        let mut current = parts.next().and_then(|first| map.get(first));
        for part in parts {
            current = current.and_then(|v| v.get(part));
        }

        Ok(match current {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(v) => Some(v.to_string()),
        })
    }

    async fn set_raw(&self, key: &str, value: &str) -> ConfigResult<()> {
        self.ensure_loaded().await?;

        let mut data = self.data.write().await;
        let map = data.get_or_insert_with(HashMap::new);
        let json_value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        map.insert(key.to_string(), json_value);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(map)?).await?;
        Ok(())
    }
}
