//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over the configured level. Output is either
//! one JSON object per line or human-readable multi-line records.
//!
//! # Usage
//!
//! ```rust,ignore
//! use trading_core::telemetry::init_tracing;
//!
//! init_tracing(&config.observability.logging)?;
//! ```

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Error raised when the global subscriber cannot be installed.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Another subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line, colored output for terminals.
    Pretty,
}

impl LogFormat {
    /// Parse a configured format name; anything but `pretty` is JSON.
    #[must_use]
    pub fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("pretty") {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns error if a global subscriber was already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match LogFormat::from_config(&config.format) {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_current_span(true)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .pretty()
            .try_init(),
    };

    result.map_err(|e| TelemetryError::Install(e.to_string()))?;

    tracing::info!(
        level = %config.level,
        format = %config.format,
        "Tracing initialized"
    );
    Ok(())
}
