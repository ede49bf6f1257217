//! Histogram assertions over a `metrics-util` debugging recorder.
//!
//! Recording happens through a thread-local recorder
//! ([`metrics::with_local_recorder`]), so tests can run in parallel without
//! fighting over the global one.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use metrics_util::MetricKind;

/// Histogram series captured from one snapshot.
#[derive(Debug, Clone, Default)]
pub struct HistogramSnapshot {
    series: Vec<HistogramSeries>,
}

#[derive(Debug, Clone)]
struct HistogramSeries {
    name: String,
    labels: Vec<(String, String)>,
    samples: Vec<f64>,
}

impl HistogramSnapshot {
    /// Take a snapshot of every histogram the recorder has seen.
    pub fn capture(snapshotter: &Snapshotter) -> Self {
        let series = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.kind() == MetricKind::Histogram)
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Histogram(samples) => Some(HistogramSeries {
                    name: key.key().name().to_string(),
                    labels: key
                        .key()
                        .labels()
                        .map(|l| (l.key().to_string(), l.value().to_string()))
                        .collect(),
                    samples: samples.into_iter().map(|s| s.into_inner()).collect(),
                }),
                _ => None,
            })
            .collect();
        Self { series }
    }

    fn find(&self, name: &str, labels: &[(&str, &str)]) -> Option<&HistogramSeries> {
        self.series.iter().find(|s| {
            s.name == name
                && s.labels.len() == labels.len()
                && labels
                    .iter()
                    .all(|(k, v)| s.labels.iter().any(|(sk, sv)| sk == k && sv == v))
        })
    }

    /// Number of samples recorded for a series (0 if absent).
    pub fn sample_count(&self, name: &str, labels: &[(&str, &str)]) -> usize {
        self.find(name, labels).map_or(0, |s| s.samples.len())
    }

    /// Recorded sample values for a series.
    pub fn samples(&self, name: &str, labels: &[(&str, &str)]) -> Vec<f64> {
        self.find(name, labels)
            .map(|s| s.samples.clone())
            .unwrap_or_default()
    }

    /// Number of distinct label sets recorded for a metric.
    pub fn series_count(&self, name: &str) -> usize {
        self.series.iter().filter(|s| s.name == name).count()
    }

    /// Total samples recorded for a metric across all label sets.
    pub fn total_count(&self, name: &str) -> usize {
        self.series
            .iter()
            .filter(|s| s.name == name)
            .map(|s| s.samples.len())
            .sum()
    }

    /// Assert the sample count of one series.
    pub fn assert_count(&self, name: &str, labels: &[(&str, &str)], expected: usize) -> &Self {
        let actual = self.sample_count(name, labels);
        assert_eq!(
            actual, expected,
            "expected {expected} samples for {name} {labels:?}, got {actual}; recorded series: {:?}",
            self.series
                .iter()
                .map(|s| (&s.name, &s.labels, s.samples.len()))
                .collect::<Vec<_>>()
        );
        self
    }
}

/// Run `f` with a fresh debugging recorder installed on this thread and
/// return the histograms it recorded.
pub fn capture_metrics<F: FnOnce()>(f: F) -> HistogramSnapshot {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, f);
    HistogramSnapshot::capture(&snapshotter)
}

/// Label pairs for the default schema, in schema order.
pub fn default_labels<'a>(
    name: &'a str,
    action: &'a str,
    model: &'a str,
    joins: &'a str,
    outcome: &'a str,
) -> [(&'static str, &'a str); 5] {
    [
        ("name", name),
        ("action", action),
        ("model", model),
        ("joins", joins),
        ("outcome", outcome),
    ]
}
