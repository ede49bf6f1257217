//! Observation sinks.
//!
//! A sink wraps one labeled duration histogram. Its label schema and buckets
//! are fixed when it is built; `observe` may be called concurrently from any
//! number of threads.

use crate::labels::{LabelSet, DEFAULT_LABEL_NAMES};
use crate::registry::{MetricRegistry, RegistryError};
use metrics::{histogram, Label};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default histogram name.
pub const DEFAULT_METRIC_NAME: &str = "op_metrics_duration_seconds";

/// Default histogram help text.
pub const DEFAULT_METRIC_HELP: &str = "Duration of instrumented operations in seconds";

/// General-purpose latency ladder, 5ms to 10s.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
];

/// Label name reserved by Prometheus for histogram buckets.
const RESERVED_BUCKET_LABEL: &str = "le";

/// Errors raised when recording an observation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Label arity mismatch for {metric}: expected {expected} values, got {actual}")]
    LabelArity {
        metric: String,
        expected: usize,
        actual: usize,
    },
}

/// Records duration samples for label tuples.
pub trait ObservationSink: Send + Sync {
    /// Label names this sink accepts, in order.
    fn label_names(&self) -> &[&'static str];

    /// Record one sample.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::LabelArity`] if `labels` does not match the
    /// declared schema. Nothing is recorded in that case.
    fn observe(&self, labels: &LabelSet, duration: Duration) -> Result<(), SinkError>;
}

/// Descriptor of a labeled duration histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSpec {
    pub name: String,
    pub help: String,
    pub buckets: Vec<f64>,
    pub label_names: Vec<&'static str>,
}

impl HistogramSpec {
    /// Spec with the default bucket ladder.
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: &[&'static str],
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            buckets: DEFAULT_BUCKETS.to_vec(),
            label_names: label_names.to_vec(),
        }
    }

    #[must_use]
    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = buckets;
        self
    }

    /// Check metric name, label names and buckets against Prometheus rules.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if !is_valid_metric_name(&self.name) {
            return Err(RegistryError::InvalidName(self.name.clone()));
        }

        for (i, label) in self.label_names.iter().enumerate() {
            if !is_valid_label_name(label) {
                return Err(RegistryError::InvalidLabels {
                    metric: self.name.clone(),
                    reason: format!("invalid label name '{label}'"),
                });
            }
            if self.label_names.iter().skip(i + 1).any(|other| other == label) {
                return Err(RegistryError::InvalidLabels {
                    metric: self.name.clone(),
                    reason: format!("duplicate label name '{label}'"),
                });
            }
        }

        if self.buckets.is_empty() {
            return Err(RegistryError::InvalidBuckets {
                metric: self.name.clone(),
                reason: "no bucket boundaries".to_string(),
            });
        }
        if self.buckets.iter().any(|b| !b.is_finite()) {
            return Err(RegistryError::InvalidBuckets {
                metric: self.name.clone(),
                reason: "bucket boundaries must be finite".to_string(),
            });
        }
        if self.buckets.windows(2).any(|w| matches!(w, [a, b] if a >= b)) {
            return Err(RegistryError::InvalidBuckets {
                metric: self.name.clone(),
                reason: "bucket boundaries must be strictly increasing".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for HistogramSpec {
    fn default() -> Self {
        Self::new(DEFAULT_METRIC_NAME, DEFAULT_METRIC_HELP, &DEFAULT_LABEL_NAMES)
    }
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") || name == RESERVED_BUCKET_LABEL {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Sink recording into the `metrics` facade.
///
/// Samples go to whichever recorder is current (thread-local or global), so
/// the exporter decides where they end up.
#[derive(Debug, Clone)]
pub struct HistogramSink {
    spec: Arc<HistogramSpec>,
}

impl HistogramSink {
    /// Build an unregistered sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec is invalid.
    pub fn new(spec: HistogramSpec) -> Result<Self, RegistryError> {
        spec.validate()?;
        Ok(Self {
            spec: Arc::new(spec),
        })
    }

    /// Build a sink and register its spec.
    ///
    /// Registering an identical spec twice is accepted.
    ///
    /// # Errors
    ///
    /// Returns any registration failure other than "already registered".
    pub fn register(spec: HistogramSpec, registry: &MetricRegistry) -> Result<Self, RegistryError> {
        match registry.register(&spec) {
            Ok(()) => {}
            Err(RegistryError::AlreadyRegistered(name)) => {
                debug!(metric = %name, "Histogram already registered, reusing");
            }
            Err(e) => return Err(e),
        }
        Ok(Self {
            spec: Arc::new(spec),
        })
    }

    #[must_use]
    pub fn spec(&self) -> &HistogramSpec {
        &self.spec
    }
}

impl ObservationSink for HistogramSink {
    fn label_names(&self) -> &[&'static str] {
        &self.spec.label_names
    }

    fn observe(&self, labels: &LabelSet, duration: Duration) -> Result<(), SinkError> {
        if labels.len() != self.spec.label_names.len() {
            return Err(SinkError::LabelArity {
                metric: self.spec.name.clone(),
                expected: self.spec.label_names.len(),
                actual: labels.len(),
            });
        }

        let labels: Vec<Label> = self
            .spec
            .label_names
            .iter()
            .zip(labels.iter())
            .map(|(key, value)| Label::new(*key, value.to_string()))
            .collect();

        histogram!(self.spec.name.clone(), labels).record(duration.as_secs_f64());
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_default_spec_is_valid() {
        HistogramSpec::default().validate().unwrap();
    }

    #[test]
    fn test_invalid_metric_names() {
        for name in ["", "1abc", "has-dash", "has space"] {
            let spec = HistogramSpec::new(name, "help", &["a"]);
            assert!(
                matches!(spec.validate(), Err(RegistryError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_label_names() {
        for labels in [&["__reserved"][..], &["le"][..], &["ok", "ok"][..], &["9lives"][..]] {
            let spec = HistogramSpec::new("valid_name", "help", labels);
            assert!(
                matches!(spec.validate(), Err(RegistryError::InvalidLabels { .. })),
                "{labels:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_buckets() {
        for buckets in [vec![], vec![0.1, 0.1], vec![0.5, 0.1], vec![0.1, f64::INFINITY]] {
            let spec = HistogramSpec::default().with_buckets(buckets.clone());
            assert!(
                matches!(spec.validate(), Err(RegistryError::InvalidBuckets { .. })),
                "{buckets:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_observe_rejects_wrong_arity() {
        let sink = HistogramSink::new(HistogramSpec::default()).unwrap();
        let err = sink
            .observe(&LabelSet::from(&["only", "two"][..]), Duration::from_millis(1))
            .unwrap_err();

        assert_eq!(
            err,
            SinkError::LabelArity {
                metric: DEFAULT_METRIC_NAME.to_string(),
                expected: 5,
                actual: 2,
            }
        );
    }

    #[test]
    fn test_observe_records_labeled_sample() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let spec = HistogramSpec::new("sink_test_seconds", "help", &["action", "outcome"]);
        let sink = HistogramSink::new(spec).unwrap();

        metrics::with_local_recorder(&recorder, || {
            sink.observe(
                &LabelSet::from(&["query", "success"][..]),
                Duration::from_millis(20),
            )
            .unwrap();
        });

        let metrics = snapshotter.snapshot().into_vec();
        let (key, _, _, value) = metrics
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "sink_test_seconds")
            .expect("histogram should be recorded");

        let labels: Vec<(&str, &str)> = key.key().labels().map(|l| (l.key(), l.value())).collect();
        assert_eq!(labels, [("action", "query"), ("outcome", "success")]);
        match value {
            DebugValue::Histogram(samples) => {
                assert_eq!(samples.len(), 1);
                assert!((samples.iter().map(|s| s.into_inner()).sum::<f64>() - 0.020).abs() < 1e-9);
            }
            other => panic!("expected histogram, got {other:?}"),
        }
    }

    #[test]
    fn test_register_reuses_identical_spec() {
        let registry = MetricRegistry::new();
        let spec = HistogramSpec::new("reused_seconds", "help", &["action"]);

        let first = HistogramSink::register(spec.clone(), &registry).unwrap();
        let second = HistogramSink::register(spec.clone(), &registry).unwrap();

        assert_eq!(first.spec(), &spec);
        assert_eq!(second.spec(), first.spec());
        assert_eq!(registry.specs().len(), 1);

        let err = HistogramSink::register(spec.with_buckets(vec![1.0]), &registry).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
    }
}
