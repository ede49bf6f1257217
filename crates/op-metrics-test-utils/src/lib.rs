//! # Operation Metrics Test Utilities
//!
//! Shared test utilities for the `op-metrics` crate.
//!
//! This crate provides:
//! - An in-memory host resource that runs its operations through an
//!   instrumented pipeline (`MemoryStore`)
//! - A sink that keeps observations in memory (`RecordingSink`)
//! - Histogram assertions over a `metrics-util` debugging recorder
//!   (`HistogramSnapshot`, `capture_metrics`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use op_metrics_test_utils::*;
//!
//! let snapshot = capture_metrics(|| {
//!     let store = MemoryStore::instrumented(&core);
//!     store.migrate("people");
//!     store.find(&InvocationContext::background(), "people", &[]).unwrap();
//! });
//! snapshot.assert_count(
//!     "op_metrics_duration_seconds",
//!     &default_labels("default", "query", "people", "0", "success"),
//!     1,
//! );
//! ```

pub mod assertions;
pub mod recording_sink;
pub mod store;

// Re-export commonly used items
pub use assertions::*;
pub use recording_sink::*;
pub use store::*;
