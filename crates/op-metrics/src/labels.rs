//! Label derivation for operation observations.
//!
//! # Cardinality
//!
//! The default schema is bounded by the host's data model:
//! - `name`: caller-supplied operation names plus `default`
//! - `action`: 6 values (see [`ActionKind`])
//! - `model`: one value per target table, plus `unknown`
//! - `joins`: small non-negative integers
//! - `outcome`: 2 values (success, error)

use crate::action::ActionKind;
use crate::context::{TimingContext, DEFAULT_OPERATION_NAME};
use crate::operation::Operation;

pub const LABEL_NAME: &str = "name";
pub const LABEL_ACTION: &str = "action";
pub const LABEL_MODEL: &str = "model";
pub const LABEL_JOINS: &str = "joins";
pub const LABEL_OUTCOME: &str = "outcome";

/// Label names of the default schema, in order.
pub const DEFAULT_LABEL_NAMES: [&str; 5] =
    [LABEL_NAME, LABEL_ACTION, LABEL_MODEL, LABEL_JOINS, LABEL_OUTCOME];

pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_ERROR: &str = "error";

/// Model label used when an operation has no target.
pub const UNKNOWN_TARGET: &str = "unknown";

/// Ordered label values for one observation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    #[must_use]
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<'a> From<&[&'a str]> for LabelSet {
    fn from(values: &[&'a str]) -> Self {
        Self(values.iter().map(|v| (*v).to_string()).collect())
    }
}

/// Maps an operation and its action kind to label values.
///
/// Implementations must be total and return exactly as many values as
/// [`LabelDeriver::label_names`] declares. The paired sink has to be built
/// with the same label names.
pub trait LabelDeriver: Send + Sync {
    /// Label names produced by [`LabelDeriver::derive`], in order.
    fn label_names(&self) -> &[&'static str];

    fn derive(&self, operation: &Operation, action: ActionKind) -> LabelSet;
}

/// Default schema: `name, action, model, joins, outcome`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLabelDeriver;

impl LabelDeriver for DefaultLabelDeriver {
    fn label_names(&self) -> &[&'static str] {
        &DEFAULT_LABEL_NAMES
    }

    fn derive(&self, operation: &Operation, action: ActionKind) -> LabelSet {
        let name = operation
            .context
            .timing()
            .map_or(DEFAULT_OPERATION_NAME, TimingContext::name);

        let model = if operation.target.is_empty() {
            UNKNOWN_TARGET.to_string()
        } else {
            operation.target.to_lowercase()
        };

        LabelSet::new(vec![
            name.to_string(),
            action.as_str().to_string(),
            model,
            operation.join_count().to_string(),
            outcome(operation).to_string(),
        ])
    }
}

/// `success` or `error` depending on whether the work failed.
#[must_use]
pub fn outcome(operation: &Operation) -> &'static str {
    if operation.is_error() {
        OUTCOME_ERROR
    } else {
        OUTCOME_SUCCESS
    }
}

/// Deriver backed by a closure, for custom label schemas.
///
/// ```rust,ignore
/// let deriver = FnLabelDeriver::new(&["action", "outcome"], |op: &Operation, action| {
///     LabelSet::from(&[action.as_str(), outcome(op)][..])
/// });
/// ```
pub struct FnLabelDeriver<F> {
    names: Vec<&'static str>,
    derive: F,
}

impl<F> FnLabelDeriver<F>
where
    F: Fn(&Operation, ActionKind) -> LabelSet + Send + Sync,
{
    pub fn new(names: &[&'static str], derive: F) -> Self {
        Self {
            names: names.to_vec(),
            derive,
        }
    }
}

impl<F> LabelDeriver for FnLabelDeriver<F>
where
    F: Fn(&Operation, ActionKind) -> LabelSet + Send + Sync,
{
    fn label_names(&self) -> &[&'static str] {
        &self.names
    }

    fn derive(&self, operation: &Operation, action: ActionKind) -> LabelSet {
        (self.derive)(operation, action)
    }
}
