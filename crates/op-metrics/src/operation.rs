//! In-flight operation metadata handed to pipeline hooks.

use crate::context::InvocationContext;
use std::error::Error;

/// Error produced by the underlying work of an operation.
pub type OperationError = Box<dyn Error + Send + Sync>;

/// One operation invocation as seen by before/after hooks.
///
/// The host fills in `target` and `joins` before execution and `error` after
/// the work has run. Instrumentation only reads `error`; it never replaces it.
#[derive(Debug, Default)]
pub struct Operation {
    /// Per-invocation context (carries the timing slot).
    pub context: InvocationContext,
    /// Table, model or resource the operation acts on.
    pub target: String,
    /// Secondary relations joined by the operation.
    pub joins: Vec<String>,
    /// Error produced by the work, if any.
    pub error: Option<OperationError>,
}

impl Operation {
    pub fn new(context: InvocationContext, target: impl Into<String>) -> Self {
        Self {
            context,
            target: target.into(),
            joins: Vec::new(),
            error: None,
        }
    }

    /// Add a joined relation.
    #[must_use]
    pub fn with_join(mut self, relation: impl Into<String>) -> Self {
        self.joins.push(relation.into());
        self
    }

    #[must_use]
    pub fn join_count(&self) -> usize {
        self.joins.len()
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Take the work's error out, leaving the operation clean.
    pub fn take_error(&mut self) -> Option<OperationError> {
        self.error.take()
    }
}
