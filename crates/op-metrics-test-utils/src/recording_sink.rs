//! In-memory observation sink.

use op_metrics::labels::{LabelSet, DEFAULT_LABEL_NAMES};
use op_metrics::sink::{ObservationSink, SinkError};
use std::sync::Mutex;
use std::time::Duration;

/// One recorded sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub labels: Vec<String>,
    pub duration: Duration,
}

/// Sink that stores every observation, safe to share across threads.
#[derive(Debug)]
pub struct RecordingSink {
    label_names: Vec<&'static str>,
    observations: Mutex<Vec<Observation>>,
}

impl RecordingSink {
    pub fn new(label_names: &[&'static str]) -> Self {
        Self {
            label_names: label_names.to_vec(),
            observations: Mutex::new(Vec::new()),
        }
    }

    /// Sink using the default label schema.
    pub fn with_default_labels() -> Self {
        Self::new(&DEFAULT_LABEL_NAMES)
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations
            .lock()
            .expect("recording sink lock poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.observations
            .lock()
            .expect("recording sink lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of observations with exactly these label values.
    pub fn count(&self, labels: &[&str]) -> usize {
        self.observations
            .lock()
            .expect("recording sink lock poisoned")
            .iter()
            .filter(|o| o.labels == labels)
            .count()
    }
}

impl ObservationSink for RecordingSink {
    fn label_names(&self) -> &[&'static str] {
        &self.label_names
    }

    fn observe(&self, labels: &LabelSet, duration: Duration) -> Result<(), SinkError> {
        if labels.len() != self.label_names.len() {
            return Err(SinkError::LabelArity {
                metric: "recording_sink".to_string(),
                expected: self.label_names.len(),
                actual: labels.len(),
            });
        }
        self.observations
            .lock()
            .expect("recording sink lock poisoned")
            .push(Observation {
                labels: labels.values().to_vec(),
                duration,
            });
        Ok(())
    }
}
