//! Configuration for the orchestration core.
//!
//! Values come from a chain of providers; the first provider holding a key
//! wins, and anything left unset falls back to [`CoreConfig::default`].
//!
//! ```rust,no_run
//! use toolgate::config::{ConfigBuilder, CoreConfig};
//!
//! # async fn example() -> Result<(), toolgate::ConfigError> {
//! let provider = ConfigBuilder::new()
//!     .env()
//!     .file("toolgate.json")
//!     .build();
//! let config = CoreConfig::load(&provider).await?;
//! # Ok(())
//! # }
//! ```

mod composite;
mod env;
mod file;
mod memory;
mod provider;
mod settings;

pub use composite::CompositeConfigProvider;
pub use env::EnvConfigProvider;
pub use file::FileConfigProvider;
pub use memory::MemoryConfigProvider;
pub use provider::{ConfigProvider, ConfigProviderExt};
pub use settings::{
    CoreConfig, DEFAULT_AUDIT_CAPACITY, DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_CONFIRMATION_TTL_SECS,
    DEFAULT_GRANT_TTL_SECS, DEFAULT_MAX_OUTPUT_CHARS, DEFAULT_MAX_PENDING,
    DEFAULT_SWEEP_INTERVAL_SECS,
};

use thiserror::Error;

/// Prefix used by [`ConfigBuilder::env`].
pub const ENV_PREFIX: &str = "TOOLGATE_";

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Key not found: {key}")]
    NotFound { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Provider error: {message}")]
    Provider { message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Fluent construction of a provider chain (first added = highest priority).
pub struct ConfigBuilder {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    /// Start with no providers
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Environment variables prefixed with `TOOLGATE_`.
    pub fn env(self) -> Self {
        self.env_with_prefix(ENV_PREFIX)
    }

    /// Add environment variables using a custom prefix
    pub fn env_with_prefix(mut self, prefix: &str) -> Self {
        self.providers
            .push(Box::new(EnvConfigProvider::prefixed(prefix)));
        self
    }

    /// Add a JSON file provider
    pub fn file(mut self, path: impl AsRef<std::path::Path>) -> Self {
        self.providers.push(Box::new(FileConfigProvider::new(
            path.as_ref().to_path_buf(),
        )));
        self
    }

    /// Add an in-memory provider
    pub fn memory(mut self, provider: MemoryConfigProvider) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Add any provider
    pub fn provider(mut self, provider: Box<dyn ConfigProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Build the provider chain in insertion order
    pub fn build(self) -> CompositeConfigProvider {
        self.providers
            .into_iter()
            .fold(CompositeConfigProvider::new(), |composite, provider| {
                composite.provider(provider)
            })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
