//! Host operation pipeline.
//!
//! The instrumentation needs two extension points per [`ActionKind`]: one
//! that runs before any work and one that runs after the work has finished,
//! successfully or not. Hosts expose them through [`HookRegistry`].
//! [`OperationPipeline`] is a self-contained host that executes operations
//! through registered hooks.

use crate::action::ActionKind;
use crate::operation::{Operation, OperationError};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Callback run around an operation.
pub type Hook = Arc<dyn Fn(&mut Operation) + Send + Sync>;

/// When a hook runs relative to the operation's work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    After,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Before => f.write_str("before"),
            Phase::After => f.write_str("after"),
        }
    }
}

/// Hook registration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("Pipeline is closed")]
    Closed,

    #[error("Hook name must not be empty")]
    EmptyName,

    #[error("Hook {name} already registered for {action} ({phase})")]
    Duplicate {
        action: ActionKind,
        phase: Phase,
        name: String,
    },
}

/// A named hook bound to one action and phase.
#[derive(Clone)]
pub struct HookRegistration {
    pub action: ActionKind,
    pub phase: Phase,
    pub name: String,
    pub hook: Hook,
}

impl HookRegistration {
    pub fn before<F>(action: ActionKind, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&mut Operation) + Send + Sync + 'static,
    {
        Self {
            action,
            phase: Phase::Before,
            name: name.into(),
            hook: Arc::new(hook),
        }
    }

    pub fn after<F>(action: ActionKind, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&mut Operation) + Send + Sync + 'static,
    {
        Self {
            action,
            phase: Phase::After,
            name: name.into(),
            hook: Arc::new(hook),
        }
    }
}

impl fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistration")
            .field("action", &self.action)
            .field("phase", &self.phase)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Something hooks can be attached to.
pub trait HookRegistry {
    /// Register every hook or none of them.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the registry is left unchanged.
    fn register_all(&mut self, hooks: Vec<HookRegistration>) -> Result<(), HookError>;
}

struct NamedHook {
    name: String,
    hook: Hook,
}

#[derive(Default)]
struct Processor {
    before: Vec<NamedHook>,
    after: Vec<NamedHook>,
}

impl Processor {
    fn phase(&self, phase: Phase) -> &[NamedHook] {
        match phase {
            Phase::Before => &self.before,
            Phase::After => &self.after,
        }
    }

    fn phase_mut(&mut self, phase: Phase) -> &mut Vec<NamedHook> {
        match phase {
            Phase::Before => &mut self.before,
            Phase::After => &mut self.after,
        }
    }
}

/// Executes operations through per-action before/after hooks.
///
/// Hooks run in registration order. After hooks always run, even when the
/// work failed or a before hook short-circuited it by setting an error.
#[derive(Default)]
pub struct OperationPipeline {
    processors: HashMap<ActionKind, Processor>,
    closed: bool,
}

impl OperationPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all hooks and refuse further registrations.
    pub fn close(&mut self) {
        self.processors.clear();
        self.closed = true;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Register a single hook.
    ///
    /// # Errors
    ///
    /// See [`HookRegistry::register_all`].
    pub fn register(&mut self, registration: HookRegistration) -> Result<(), HookError> {
        self.register_all(vec![registration])
    }

    /// Hook names for an action and phase, in execution order.
    #[must_use]
    pub fn hook_names(&self, action: ActionKind, phase: Phase) -> Vec<String> {
        self.processors
            .get(&action)
            .map(|p| p.phase(phase).iter().map(|h| h.name.clone()).collect())
            .unwrap_or_default()
    }

    fn check(&self, pending: &[HookRegistration]) -> Result<(), HookError> {
        if self.closed {
            return Err(HookError::Closed);
        }

        let mut seen: HashSet<(ActionKind, Phase, &str)> = HashSet::new();
        for reg in pending {
            if reg.name.is_empty() {
                return Err(HookError::EmptyName);
            }
            let taken = self
                .processors
                .get(&reg.action)
                .is_some_and(|p| p.phase(reg.phase).iter().any(|h| h.name == reg.name));
            if taken || !seen.insert((reg.action, reg.phase, reg.name.as_str())) {
                return Err(HookError::Duplicate {
                    action: reg.action,
                    phase: reg.phase,
                    name: reg.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Run `work` for `action`, surrounded by the registered hooks.
    ///
    /// An error returned by `work` is stored in `operation.error`.
    pub fn execute<F>(&self, action: ActionKind, operation: &mut Operation, work: F)
    where
        F: FnOnce(&mut Operation) -> Result<(), OperationError>,
    {
        let processor = self.processors.get(&action);

        if let Some(processor) = processor {
            for h in &processor.before {
                (h.hook)(operation);
            }
        }

        if operation.error.is_none() {
            if let Err(e) = work(operation) {
                operation.error = Some(e);
            }
        }

        if let Some(processor) = processor {
            for h in &processor.after {
                (h.hook)(operation);
            }
        }
    }
}

impl HookRegistry for OperationPipeline {
    fn register_all(&mut self, hooks: Vec<HookRegistration>) -> Result<(), HookError> {
        self.check(&hooks)?;

        for reg in hooks {
            self.processors
                .entry(reg.action)
                .or_default()
                .phase_mut(reg.phase)
                .push(NamedHook {
                    name: reg.name,
                    hook: reg.hook,
                });
        }
        Ok(())
    }
}

impl fmt::Debug for OperationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationPipeline")
            .field("actions", &self.processors.keys().collect::<Vec<_>>())
            .field("closed", &self.closed)
            .finish()
    }
}
