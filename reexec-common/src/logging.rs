//! Logging setup for the reexec binary.
//!
//! Logs go to stderr so they never interleave with build output on stdout.

use crate::config::EnvOverrides;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },

    #[error("logging already initialized: {0}")]
    Init(String),
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Level or full `EnvFilter` directive.
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl LogConfig {
    /// From `REEXEC_LOG_LEVEL` / `REEXEC_LOG_JSON`; `verbose` forces debug.
    pub fn from_env(overrides: &EnvOverrides, verbose: bool) -> Self {
        Self {
            filter: if verbose {
                "debug".to_string()
            } else {
                overrides.log_level.value.clone()
            },
            json: overrides.log_json.value,
        }
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|err| LoggingError::Filter {
        filter: config.filter.clone(),
        message: err.to_string(),
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|err| LoggingError::Init(err.to_string()))
}
