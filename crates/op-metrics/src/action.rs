//! Action kinds for instrumented operations.
//!
//! The set is closed: every kind gets exactly one before/after hook pair
//! when the instrumentation is installed on a host pipeline.

use std::fmt;

/// Category of data-access operation being timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Query,
    Create,
    Update,
    Delete,
    Row,
    Raw,
}

impl ActionKind {
    /// All action kinds, in hook registration order.
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Query,
        ActionKind::Create,
        ActionKind::Update,
        ActionKind::Delete,
        ActionKind::Row,
        ActionKind::Raw,
    ];

    /// Label value for this action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Query => "query",
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::Row => "row",
            ActionKind::Raw => "raw",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
