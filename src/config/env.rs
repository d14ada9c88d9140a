//! Environment variable configuration provider.
//!
//! Read-only: mutating the process environment is not thread-safe.

use super::provider::ConfigProvider;
use super::{ConfigError, ConfigResult};

/// Reads `PREFIX_KEY` environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    prefix: Option<String>,
}

impl EnvConfigProvider {
    /// Provider using the `TOOLGATE_` prefix
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Provider with a custom prefix
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// `confirmation_ttl_secs` -> `TOOLGATE_CONFIRMATION_TTL_SECS`
    fn env_key(&self, key: &str) -> String {
        let key = key.to_uppercase().replace('.', "_");
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key,
        }
    }
}

#[async_trait::async_trait]
impl ConfigProvider for EnvConfigProvider {
    fn name(&self) -> &str {
        "env"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        match std::env::var(self.env_key(key)) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }

    async fn set_raw(&self, _key: &str, _value: &str) -> ConfigResult<()> {
        Err(ConfigError::Provider {
            message: "Environment variables are read-only at runtime".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key() {
        let provider = EnvConfigProvider::prefixed("TOOLGATE_");
        assert_eq!(
            provider.env_key("confirmation_ttl_secs"),
            "TOOLGATE_CONFIRMATION_TTL_SECS"
        );
        assert_eq!(EnvConfigProvider::new().env_key("a.b"), "A_B");
    }

    #[tokio::test]
    async fn test_env_lookup() {
        let provider = EnvConfigProvider::new();
        let path = provider.get_raw("PATH").await.unwrap();
        assert!(path.is_some());

        let missing = EnvConfigProvider::prefixed("TOOLGATE_TEST_UNSET_")
            .get_raw("nothing_here")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_env_read_only() {
        let provider = EnvConfigProvider::new();
        assert!(provider.set_raw("key", "value").await.is_err());
    }
}
