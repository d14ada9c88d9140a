//! Structured logging.
//!
//! The crate only emits `tracing` events and spans; installing a subscriber is
//! left to the host. With the `subscriber` feature, [`init_tracing`] installs a
//! `tracing-subscriber` fmt layer filtered by `RUST_LOG`.

use tracing::Span;

use crate::tools::WorkMode;

/// Verbosity for [`init_tracing`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracingLevel {
    #[default]
    Info,
    Debug,
    Trace,
}

impl TracingLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            TracingLevel::Info => "info",
            TracingLevel::Debug => "debug",
            TracingLevel::Trace => "trace",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TracingConfig {
    pub level: TracingLevel,
    pub with_target: bool,
}

impl TracingConfig {
    pub fn new(level: TracingLevel) -> Self {
        Self {
            level,
            with_target: true,
        }
    }
}

/// Span wrapping one tool call.
pub fn tool_span(tool: &str, mode: WorkMode) -> Span {
    tracing::info_span!("tool_call", tool = %tool, mode = %mode)
}

/// Install a global fmt subscriber. `RUST_LOG` takes precedence over
/// `config.level`. Fails if a global subscriber is already set.
#[cfg(feature = "subscriber")]
pub fn init_tracing(config: &TracingConfig) -> crate::Result<()> {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.with_target)
        .try_init()
        .map_err(|e| crate::Error::config(format!("Failed to install tracing subscriber: {}", e)))
}
