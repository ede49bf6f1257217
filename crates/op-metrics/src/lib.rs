//! Operation instrumentation.
//!
//! Times named, fallible operations run through a host pipeline and records
//! each one as a labeled histogram sample.
//!
//! # Architecture
//!
//! ```text
//! caller -> context::with_name -> pipeline::execute
//!        -> Instrumentation::before -> work -> Instrumentation::after
//!        -> LabelDeriver::derive -> ObservationSink::observe
//! ```
//!
//! # Modules
//!
//! - `action` - Closed set of action kinds
//! - `context` - Per-invocation timing context and the caller naming API
//! - `operation` - Operation metadata passed to hooks
//! - `labels` - Label sets and derivers
//! - `sink` - Observation sinks and histogram descriptors
//! - `registry` - Process-wide metric registry
//! - `instrumentation` - Before/after hook orchestration
//! - `pipeline` - Host hook registration surface
//! - `default` - Shared default instrumentation
//! - `config` - Configuration from environment
//! - `errors` - Setup error types
//! - `observability` - Prometheus exporter wiring

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod config;
pub mod context;
pub mod default;
pub mod errors;
pub mod instrumentation;
pub mod labels;
pub mod observability;
pub mod operation;
pub mod pipeline;
pub mod registry;
pub mod sink;

pub use action::ActionKind;
pub use context::{with_name, with_name_context, InvocationContext, TimingContext};
pub use default::default_instrumentation;
pub use errors::OpMetricsError;
pub use instrumentation::{Completion, Instrumentation};
pub use labels::{DefaultLabelDeriver, LabelDeriver, LabelSet};
pub use operation::Operation;
pub use pipeline::{HookRegistry, OperationPipeline};
pub use sink::{HistogramSink, HistogramSpec, ObservationSink};
