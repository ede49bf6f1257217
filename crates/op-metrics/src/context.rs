//! Per-invocation timing context.
//!
//! An [`InvocationContext`] travels with a single operation call. It holds at
//! most one [`TimingContext`] in a typed slot, so looking it up is a plain
//! `Option` rather than a keyed, dynamically-typed lookup.
//!
//! Callers tag a context with a custom operation name before running an
//! instrumented operation:
//!
//! ```rust,ignore
//! let mut op = Operation::new(with_name("my_update"), "things");
//! pipeline.execute(ActionKind::Update, &mut op, |op| store.update(op));
//! ```

use std::time::{Duration, Instant};

/// Operation name used when the caller did not supply one.
pub const DEFAULT_OPERATION_NAME: &str = "default";

/// Start timestamp and operation name for one in-flight invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingContext {
    start: Instant,
    name: String,
}

impl TimingContext {
    /// Create a timing context that starts now.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Operation name supplied by the caller (or the default sentinel).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When timing started (or was last restarted).
    #[must_use]
    pub fn start(&self) -> Instant {
        self.start
    }

    /// Time since start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Reset the start time, keeping the name.
    pub(crate) fn restart(&mut self) {
        self.start = Instant::now();
    }
}

/// Context value passed along with one operation invocation.
///
/// Cloning a context clones its timing slot; each invocation should own its
/// own context so concurrent calls never share timing state.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    timing: Option<TimingContext>,
}

impl InvocationContext {
    /// An empty context with no timing attached.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context carrying a fresh timing context with the given name.
    ///
    /// `self` is left untouched.
    #[must_use]
    pub fn attach(&self, name: impl Into<String>) -> Self {
        Self {
            timing: Some(TimingContext::new(name)),
        }
    }

    /// Timing context attached to this invocation, if any.
    #[must_use]
    pub fn timing(&self) -> Option<&TimingContext> {
        self.timing.as_ref()
    }

    /// Derive a context with the timing slot cleared.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self { timing: None }
    }

    pub(crate) fn timing_mut(&mut self) -> Option<&mut TimingContext> {
        self.timing.as_mut()
    }

    pub(crate) fn set_timing(&mut self, timing: TimingContext) {
        self.timing = Some(timing);
    }
}

/// Fresh context tagged with an operation name.
#[must_use]
pub fn with_name(name: impl Into<String>) -> InvocationContext {
    with_name_context(&InvocationContext::background(), name)
}

/// Derive `ctx` into a context tagged with an operation name.
#[must_use]
pub fn with_name_context(ctx: &InvocationContext, name: impl Into<String>) -> InvocationContext {
    ctx.attach(name)
}
