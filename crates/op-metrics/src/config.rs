//! Instrumentation configuration.
//!
//! Configuration is loaded from environment variables. Every field has a
//! default, so an empty environment yields the stock histogram.

use crate::labels::DEFAULT_LABEL_NAMES;
use crate::sink::{HistogramSpec, DEFAULT_BUCKETS, DEFAULT_METRIC_HELP, DEFAULT_METRIC_NAME};
use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default bind address for the demo `/metrics` endpoint.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9090";

/// Default delay between simulated operations in the demo.
pub const DEFAULT_WORKLOAD_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Histogram name (default: `op_metrics_duration_seconds`).
    pub metric_name: String,

    /// Histogram help text.
    pub metric_help: String,

    /// Histogram bucket boundaries in seconds.
    pub buckets: Vec<f64>,

    /// Demo server bind address (default: "0.0.0.0:9090").
    pub bind_address: String,

    /// Demo delay between simulated operations, in milliseconds.
    pub workload_interval_ms: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid metric name: {0}")]
    InvalidMetricName(String),

    #[error("Invalid bucket configuration: {0}")]
    InvalidBuckets(String),

    #[error("Invalid workload interval: {0}")]
    InvalidWorkloadInterval(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metric_name: DEFAULT_METRIC_NAME.to_string(),
            metric_help: DEFAULT_METRIC_HELP.to_string(),
            buckets: DEFAULT_BUCKETS.to_vec(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            workload_interval_ms: DEFAULT_WORKLOAD_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let metric_name = vars
            .get("OP_METRICS_NAME")
            .cloned()
            .unwrap_or(defaults.metric_name);
        if metric_name.trim().is_empty() {
            return Err(ConfigError::InvalidMetricName(
                "OP_METRICS_NAME must not be empty".to_string(),
            ));
        }

        let metric_help = vars
            .get("OP_METRICS_HELP")
            .cloned()
            .unwrap_or(defaults.metric_help);

        let buckets = match vars.get("OP_METRICS_BUCKETS") {
            Some(value) => parse_buckets(value)?,
            None => defaults.buckets,
        };

        let bind_address = vars
            .get("OP_METRICS_BIND_ADDRESS")
            .cloned()
            .unwrap_or(defaults.bind_address);

        let workload_interval_ms = match vars.get("OP_METRICS_WORKLOAD_INTERVAL_MS") {
            Some(value) => {
                let ms: u64 = value.parse().map_err(|e| {
                    ConfigError::InvalidWorkloadInterval(format!(
                        "OP_METRICS_WORKLOAD_INTERVAL_MS must be a positive integer: {e}"
                    ))
                })?;
                if ms == 0 {
                    return Err(ConfigError::InvalidWorkloadInterval(
                        "OP_METRICS_WORKLOAD_INTERVAL_MS must be greater than 0".to_string(),
                    ));
                }
                ms
            }
            None => defaults.workload_interval_ms,
        };

        Ok(Self {
            metric_name,
            metric_help,
            buckets,
            bind_address,
            workload_interval_ms,
        })
    }

    /// Histogram spec with the default label schema.
    #[must_use]
    pub fn histogram_spec(&self) -> HistogramSpec {
        HistogramSpec::new(&self.metric_name, &self.metric_help, &DEFAULT_LABEL_NAMES)
            .with_buckets(self.buckets.clone())
    }
}

/// Parse a comma-separated, strictly increasing list of bucket boundaries.
fn parse_buckets(value: &str) -> Result<Vec<f64>, ConfigError> {
    let buckets = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>().map_err(|e| {
                ConfigError::InvalidBuckets(format!("'{s}' is not a number: {e}"))
            })
        })
        .collect::<Result<Vec<f64>, ConfigError>>()?;

    if buckets.is_empty() {
        return Err(ConfigError::InvalidBuckets(
            "OP_METRICS_BUCKETS must list at least one boundary".to_string(),
        ));
    }
    if buckets.iter().any(|b| !b.is_finite() || *b <= 0.0) {
        return Err(ConfigError::InvalidBuckets(
            "bucket boundaries must be positive and finite".to_string(),
        ));
    }
    if buckets.windows(2).any(|w| matches!(w, [a, b] if a >= b)) {
        return Err(ConfigError::InvalidBuckets(
            "bucket boundaries must be strictly increasing".to_string(),
        ));
    }
    Ok(buckets)
}
