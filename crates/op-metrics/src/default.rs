//! Process-wide default instrumentation.
//!
//! The default pairs the stock histogram (`op_metrics_duration_seconds`,
//! default buckets, default labels) registered in
//! [`MetricRegistry::global`] with [`DefaultLabelDeriver`]. To use another
//! metric name, buckets or registry, build an [`Instrumentation`] directly.
//!
//! [`DefaultLabelDeriver`]: crate::labels::DefaultLabelDeriver

use crate::errors::Result;
use crate::instrumentation::Instrumentation;
use crate::registry::MetricRegistry;
use crate::sink::{HistogramSink, HistogramSpec};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::info;

static DEFAULT_INSTRUMENTATION: OnceLock<Instrumentation> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// The shared default instrumentation, built on first use.
///
/// Later calls return the same instance. If the stock histogram was
/// already registered (by an earlier caller or by hand) that registration
/// is reused.
///
/// # Errors
///
/// Returns any registration failure other than "already registered", for
/// example a different descriptor registered under the default name.
pub fn default_instrumentation() -> Result<&'static Instrumentation> {
    if let Some(instrumentation) = DEFAULT_INSTRUMENTATION.get() {
        return Ok(instrumentation);
    }

    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(instrumentation) = DEFAULT_INSTRUMENTATION.get() {
        return Ok(instrumentation);
    }

    let instrumentation = build_default(MetricRegistry::global())?;
    info!("Default operation instrumentation initialized");
    Ok(DEFAULT_INSTRUMENTATION.get_or_init(|| instrumentation))
}

/// Build a default-shaped instrumentation against `registry`.
///
/// Idempotent per registry: an identical existing registration is reused.
///
/// # Errors
///
/// Returns any registration failure other than "already registered".
pub fn build_default(registry: &MetricRegistry) -> Result<Instrumentation> {
    let sink = HistogramSink::register(HistogramSpec::default(), registry)?;
    Instrumentation::with_default_labels(Arc::new(sink))
}
