//! Observability wiring for the instrumentation.
//!
//! Provides the Prometheus exporter setup for registered histograms.

pub mod exporter;
