//! Setup-time error types.
//!
//! Only setup can fail loudly. Once installed, the instrumentation never
//! surfaces errors into the operations it observes.

use crate::config::ConfigError;
use crate::pipeline::HookError;
use crate::registry::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpMetricsError {
    /// Metric registration failed for a reason other than "already registered"
    #[error("Metric registration failed: {0}")]
    Registry(#[from] RegistryError),

    /// A hook could not be attached to the host pipeline
    #[error("Hook registration failed: {0}")]
    HookRegistration(#[from] HookError),

    /// Deriver and sink disagree on the label schema
    #[error("Label schema mismatch: deriver produces {deriver:?}, sink expects {sink:?}")]
    SchemaMismatch {
        deriver: Vec<&'static str>,
        sink: Vec<&'static str>,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Result type alias using `OpMetricsError`
pub type Result<T> = std::result::Result<T, OpMetricsError>;
