//! Configuration provider trait.

use serde::{Serialize, de::DeserializeOwned};

use super::{ConfigError, ConfigResult};

/// Source of raw string configuration values.
#[async_trait::async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>>;

    async fn set_raw(&self, key: &str, value: &str) -> ConfigResult<()>;
}

/// Typed access on top of the raw string interface.
pub trait ConfigProviderExt: ConfigProvider {
    /// Parse the raw value as JSON, falling back to a bare JSON string so that
    /// `TOOLGATE_SECRET_PATH=/tmp/key` works without quoting.
    fn get<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = ConfigResult<Option<T>>> + Send
    where
        Self: Sync,
    {
        async move {
            let Some(raw) = self.get_raw(key).await? else {
                return Ok(None);
            };
            serde_json::from_str::<T>(&raw)
                .or_else(|_| serde_json::from_value::<T>(serde_json::Value::String(raw.clone())))
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
    }

    fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> impl std::future::Future<Output = ConfigResult<()>> + Send
    where
        Self: Sync,
    {
        async move {
            let raw = serde_json::to_string(value)?;
            self.set_raw(key, &raw).await
        }
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProviderExt for P {}
