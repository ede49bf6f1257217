//! Process-wide metric registry.
//!
//! The `metrics` facade registers series lazily and has no notion of bucket
//! boundaries, so histogram descriptors are kept here. The exporter reads
//! them back to configure buckets (see [`crate::observability::exporter`]).

use crate::sink::HistogramSpec;
use metrics::{describe_histogram, Unit};
use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock, PoisonError};
use thiserror::Error;
use tracing::info;

static GLOBAL_REGISTRY: OnceLock<MetricRegistry> = OnceLock::new();

/// Metric registration errors.
///
/// Only [`RegistryError::AlreadyRegistered`] is benign; everything else is a
/// configuration defect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Metric already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Metric {0} already registered with a different descriptor")]
    Conflict(String),

    #[error("Invalid metric name: {0:?}")]
    InvalidName(String),

    #[error("Invalid labels for {metric}: {reason}")]
    InvalidLabels { metric: String, reason: String },

    #[error("Invalid buckets for {metric}: {reason}")]
    InvalidBuckets { metric: String, reason: String },
}

impl RegistryError {
    #[must_use]
    pub fn is_already_registered(&self) -> bool {
        matches!(self, RegistryError::AlreadyRegistered(_))
    }
}

/// Registered histogram descriptors keyed by metric name.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    specs: Mutex<BTreeMap<String, HistogramSpec>>,
}

impl MetricRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static MetricRegistry {
        GLOBAL_REGISTRY.get_or_init(MetricRegistry::new)
    }

    /// Register a histogram descriptor and describe it to the current
    /// `metrics` recorder.
    ///
    /// # Errors
    ///
    /// - `AlreadyRegistered` if an identical descriptor exists
    /// - `Conflict` if the name is taken by a different descriptor
    /// - validation errors from [`HistogramSpec::validate`]
    pub fn register(&self, spec: &HistogramSpec) -> Result<(), RegistryError> {
        spec.validate()?;

        {
            let mut specs = self.specs.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = specs.get(&spec.name) {
                return Err(if existing == spec {
                    RegistryError::AlreadyRegistered(spec.name.clone())
                } else {
                    RegistryError::Conflict(spec.name.clone())
                });
            }
            specs.insert(spec.name.clone(), spec.clone());
        }

        describe_histogram!(spec.name.clone(), Unit::Seconds, spec.help.clone());

        info!(
            metric = %spec.name,
            labels = ?spec.label_names,
            buckets = spec.buckets.len(),
            "Registered histogram"
        );
        Ok(())
    }

    /// Describe every registered histogram to the current recorder.
    ///
    /// Descriptions sent before a recorder is installed are lost; call this
    /// once the exporter is in place.
    pub fn describe_all(&self) {
        for spec in self.specs() {
            describe_histogram!(spec.name, Unit::Seconds, spec.help);
        }
    }

    /// Descriptor registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<HistogramSpec> {
        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All registered descriptors, ordered by name.
    #[must_use]
    pub fn specs(&self) -> Vec<HistogramSpec> {
        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
