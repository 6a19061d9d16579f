//! Simulated broker configuration.

use serde::{Deserialize, Serialize};

/// Randomized fill simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Probability that an execution fills only part of the remainder.
    #[serde(default = "default_partial_fill_probability")]
    pub partial_fill_probability: f64,
    /// Smallest share of the remainder a partial execution fills.
    #[serde(default = "default_partial_ratio_min")]
    pub partial_ratio_min: f64,
    /// Largest share of the remainder a partial execution fills.
    #[serde(default = "default_partial_ratio_max")]
    pub partial_ratio_max: f64,
    /// Shortest delay before an execution, in milliseconds.
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,
    /// Longest delay before an execution, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Fixed RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            partial_fill_probability: default_partial_fill_probability(),
            partial_ratio_min: default_partial_ratio_min(),
            partial_ratio_max: default_partial_ratio_max(),
            min_delay_ms: default_min_delay(),
            max_delay_ms: default_max_delay(),
            seed: None,
        }
    }
}

const fn default_partial_fill_probability() -> f64 {
    0.3
}

const fn default_partial_ratio_min() -> f64 {
    0.3
}

const fn default_partial_ratio_max() -> f64 {
    0.7
}

const fn default_min_delay() -> u64 {
    50
}

const fn default_max_delay() -> u64 {
    500
}
