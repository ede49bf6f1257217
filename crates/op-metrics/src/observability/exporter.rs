//! Prometheus exporter for registered histograms.
//!
//! The `metrics` facade records raw samples; bucket boundaries are applied
//! here, per metric, from the descriptors held in a [`MetricRegistry`].
//! Register histograms before building the recorder, since metrics
//! registered later fall back to the exporter's summary output. The default
//! histogram is the exception: its buckets are always configured, so
//! [`crate::default_instrumentation`] may be acquired after the exporter is
//! installed.

use crate::registry::MetricRegistry;
use crate::sink::HistogramSpec;
use metrics_exporter_prometheus::{
    Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};
use tracing::info;

/// Builder with per-metric buckets for every registered histogram, plus the
/// default histogram.
fn builder_for(registry: &MetricRegistry) -> Result<PrometheusBuilder, String> {
    let mut specs = registry.specs();
    let default_spec = HistogramSpec::default();
    if !specs.iter().any(|s| s.name == default_spec.name) {
        specs.push(default_spec);
    }

    let mut builder = PrometheusBuilder::new();
    for spec in specs {
        builder = builder
            .set_buckets_for_metric(Matcher::Full(spec.name.clone()), &spec.buckets)
            .map_err(|e| format!("Failed to set buckets for {}: {e}", spec.name))?;
    }
    Ok(builder)
}

/// Initialize the global Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder(registry: &MetricRegistry) -> Result<PrometheusHandle, String> {
    let handle = builder_for(registry)?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))?;
    registry.describe_all();

    info!(
        histograms = registry.specs().len(),
        "Prometheus metrics recorder installed"
    );
    Ok(handle)
}

/// Build a Prometheus recorder without installing it globally.
///
/// Use with [`metrics::with_local_recorder`] to scope recording, e.g. in
/// tests.
///
/// # Errors
///
/// Returns error if a registered bucket list is rejected by the exporter.
pub fn build_metrics_recorder(registry: &MetricRegistry) -> Result<PrometheusRecorder, String> {
    Ok(builder_for(registry)?.build_recorder())
}
