//! Configuration for the trading core.
//!
//! YAML file with `${VAR}` / `${VAR:-default}` environment interpolation,
//! per-field defaults, and validation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use trading_core::config::load_config;
//!
//! let config = load_config(Some("config.yaml"))?;
//! println!("probe interval: {}s", config.health.check_interval_secs);
//! ```

mod execution;
mod health;
mod observability;
mod risk;
mod simulation;
mod tracking;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use execution::{ExecutionConfig, FeeConfig};
pub use health::HealthConfig;
pub use observability::{LoggingConfig, MetricsSettings, ObservabilityConfig};
pub use risk::RiskConfig;
pub use simulation::SimulationConfig;
pub use tracking::TrackingConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Order execution.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Risk governor.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Connection health monitor.
    #[serde(default)]
    pub health: HealthConfig,
    /// Position and portfolio tracker.
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Simulated broker.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let mut result = input.to_string();

    // Match ${VAR} or ${VAR:-default} patterns
    let re = ENV_VAR_REGEX.get_or_init(|| {
        // This regex pattern is compile-time constant and always valid
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    for cap in re.captures_iter(input) {
        // Group 0 and group 1 are guaranteed by the regex pattern structure
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let full_match = full_match.as_str();
        let var_name = var_match.as_str();
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match, &value);
    }

    result
}

/// Validate configuration values.
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` naming the first offending field.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let health = &config.health;
    if health.check_interval_secs == 0 {
        return invalid("health.check_interval_secs must be positive");
    }
    if health.probe_timeout_secs == 0 {
        return invalid("health.probe_timeout_secs must be positive");
    }
    if health.retry_ceiling == 0 {
        return invalid("health.retry_ceiling must be at least 1");
    }

    if config.tracking.refresh_interval_ms == 0 {
        return invalid("tracking.refresh_interval_ms must be positive");
    }
    if config.tracking.utc_offset_minutes.abs() >= MINUTES_PER_DAY
        || config.risk.reset_utc_offset_minutes.abs() >= MINUTES_PER_DAY
    {
        return invalid("utc offsets must be within one day");
    }

    if config.execution.broker_timeout_secs == 0 {
        return invalid("execution.broker_timeout_secs must be positive");
    }

    let fees = &config.execution.fees;
    if fees.per_share_commission.is_sign_negative()
        || fees.minimum_commission.is_sign_negative()
        || fees.sell_fee_rate.is_sign_negative()
    {
        return invalid("execution.fees values must be non-negative");
    }

    let sim = &config.simulation;
    if !(0.0..=1.0).contains(&sim.partial_fill_probability) {
        return invalid("simulation.partial_fill_probability must be between 0.0 and 1.0");
    }
    if sim.partial_ratio_min <= 0.0
        || sim.partial_ratio_max >= 1.0
        || sim.partial_ratio_min > sim.partial_ratio_max
    {
        return invalid("simulation partial ratios must satisfy 0 < min <= max < 1");
    }
    if sim.min_delay_ms > sim.max_delay_ms {
        return invalid("simulation.min_delay_ms must not exceed max_delay_ms");
    }

    config
        .risk
        .default_limits
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("risk.default_limits: {e}")))?;
    for (user, limits) in &config.risk.user_limits {
        limits
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("risk.user_limits.{user}: {e}")))?;
    }

    let valid_formats = ["json", "pretty"];
    if !valid_formats.contains(&config.observability.logging.format.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "observability.logging.format must be one of: {valid_formats:?}"
        )));
    }

    Ok(())
}

const MINUTES_PER_DAY: i32 = 24 * 60;

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.to_string()))
}
