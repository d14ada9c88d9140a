//! Typed settings for the orchestration core.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::provider::{ConfigProvider, ConfigProviderExt};
use super::{ConfigError, ConfigResult};
use crate::agent::{DEFAULT_HISTORY_CAP, DEFAULT_MAX_ITERATIONS};

pub const DEFAULT_CONFIRMATION_TTL_SECS: u64 = 300;
pub const DEFAULT_MAX_PENDING: usize = 100;
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_GRANT_TTL_SECS: u64 = 30 * 24 * 60 * 60;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 30_000;

/// Settings for the orchestration core. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub max_iterations: u32,
    pub history_cap: usize,
    pub confirmation_ttl_secs: u64,
    pub max_pending_confirmations: usize,
    pub audit_capacity: usize,
    pub sweep_interval_secs: u64,
    pub grant_ttl_secs: u64,
    pub command_timeout_secs: u64,
    pub max_output_chars: usize,
    pub working_dir: Option<PathBuf>,
    /// Where the confirmation secret lives. `None` uses the platform data dir.
    pub secret_path: Option<PathBuf>,
    /// When false the secret is kept in memory and grants do not survive a restart.
    pub persist_secret: bool,
    pub skill_dirs: Vec<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history_cap: DEFAULT_HISTORY_CAP,
            confirmation_ttl_secs: DEFAULT_CONFIRMATION_TTL_SECS,
            max_pending_confirmations: DEFAULT_MAX_PENDING,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            grant_ttl_secs: DEFAULT_GRANT_TTL_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            working_dir: None,
            secret_path: None,
            persist_secret: true,
            skill_dirs: Vec::new(),
        }
    }
}

macro_rules! load_field {
    ($config:ident, $provider:ident, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $provider.get(stringify!($field)).await? {
                $config.$field = value;
            }
        )+
    };
}

impl CoreConfig {
    /// Overlay every key the provider knows onto the defaults, then validate.
    pub async fn load<P: ConfigProvider + ?Sized>(provider: &P) -> ConfigResult<Self> {
        let mut config = Self::default();

        load_field!(
            config,
            provider,
            max_iterations,
            history_cap,
            confirmation_ttl_secs,
            max_pending_confirmations,
            audit_capacity,
            sweep_interval_secs,
            grant_ttl_secs,
            command_timeout_secs,
            max_output_chars,
            persist_secret,
            skill_dirs,
        );

        if let Some(dir) = provider.get::<PathBuf>("working_dir").await? {
            config.working_dir = Some(dir);
        }
        if let Some(path) = provider.get::<PathBuf>("secret_path").await? {
            config.secret_path = Some(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject zero TTLs, capacities and limits.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("max_iterations", self.max_iterations as u64),
            ("history_cap", self.history_cap as u64),
            ("confirmation_ttl_secs", self.confirmation_ttl_secs),
            ("max_pending_confirmations", self.max_pending_confirmations as u64),
            ("audit_capacity", self.audit_capacity as u64),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("command_timeout_secs", self.command_timeout_secs),
            ("max_output_chars", self.max_output_chars as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.grant_ttl_secs < self.confirmation_ttl_secs {
            return Err(ConfigError::InvalidValue {
                key: "grant_ttl_secs".to_string(),
                message: "must not be shorter than confirmation_ttl_secs".to_string(),
            });
        }
        Ok(())
    }

    pub fn confirmation_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmation_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn grant_ttl(&self) -> Duration {
        Duration::from_secs(self.grant_ttl_secs)
    }

    /// Default timeout for `run_command`.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
