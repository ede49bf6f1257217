//! Instrumentation core.
//!
//! Each invocation moves through `UNSTARTED -> STARTED -> OBSERVED`, or ends
//! in `SKIPPED` when the after hook finds no timing context. The before hook
//! attaches a default-named [`TimingContext`] or restarts the clock on an
//! existing one; the after hook derives labels and records the elapsed time.
//!
//! Invocations that never reach the after hook (short-circuited or
//! cancelled by the host) stay in `STARTED` and are never observed.

use crate::action::ActionKind;
use crate::config::Config;
use crate::context::{TimingContext, DEFAULT_OPERATION_NAME};
use crate::errors::{OpMetricsError, Result};
use crate::labels::{DefaultLabelDeriver, LabelDeriver};
use crate::operation::Operation;
use crate::pipeline::{HookRegistration, HookRegistry};
use crate::registry::MetricRegistry;
use crate::sink::{HistogramSink, ObservationSink};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Prefix of every hook name registered by the instrumentation.
pub const HOOK_PREFIX: &str = "op-metrics";

/// Result of the after hook for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A sample was recorded with this elapsed time.
    Observed(Duration),
    /// No timing context; nothing recorded.
    Skipped,
    /// The sink refused the derived labels; nothing recorded.
    Rejected,
}

/// Before/after hook pair that times operations and feeds a sink.
///
/// Cheap to clone; clones share the sink and deriver.
#[derive(Clone)]
pub struct Instrumentation {
    sink: Arc<dyn ObservationSink>,
    deriver: Arc<dyn LabelDeriver>,
}

impl Instrumentation {
    /// Pair a sink with a label deriver.
    ///
    /// # Errors
    ///
    /// Returns [`OpMetricsError::SchemaMismatch`] if the deriver's label
    /// names differ from the sink's.
    pub fn new(sink: Arc<dyn ObservationSink>, deriver: Arc<dyn LabelDeriver>) -> Result<Self> {
        if deriver.label_names() != sink.label_names() {
            return Err(OpMetricsError::SchemaMismatch {
                deriver: deriver.label_names().to_vec(),
                sink: sink.label_names().to_vec(),
            });
        }
        Ok(Self { sink, deriver })
    }

    /// Pair a sink with [`DefaultLabelDeriver`].
    ///
    /// # Errors
    ///
    /// Fails if the sink was not built with the default label schema.
    pub fn with_default_labels(sink: Arc<dyn ObservationSink>) -> Result<Self> {
        Self::new(sink, Arc::new(DefaultLabelDeriver))
    }

    /// Build a histogram sink from configuration, register it and pair it
    /// with the default deriver.
    ///
    /// # Errors
    ///
    /// Returns any registration failure other than "already registered".
    pub fn from_config(config: &Config, registry: &MetricRegistry) -> Result<Self> {
        let sink = HistogramSink::register(config.histogram_spec(), registry)?;
        Self::with_default_labels(Arc::new(sink))
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<dyn ObservationSink> {
        &self.sink
    }

    /// Start (or restart) timing for an operation.
    pub fn before(&self, operation: &mut Operation) {
        match operation.context.timing_mut() {
            Some(timing) => timing.restart(),
            None => operation
                .context
                .set_timing(TimingContext::new(DEFAULT_OPERATION_NAME)),
        }
    }

    /// Record the elapsed time of a finished operation.
    ///
    /// Never fails: a missing timing context is skipped, and a sink error is
    /// logged.
    ///
    /// Schema disagreements are caught by [`Instrumentation::new`]. What is
    /// left is a deriver that declares the sink's schema but emits a tuple of
    /// another length. That is reported at `error` level on every affected
    /// call and returned as [`Completion::Rejected`], never raised into the
    /// host operation.
    pub fn after(&self, operation: &Operation, action: ActionKind) -> Completion {
        let Some(timing) = operation.context.timing() else {
            debug!(
                action = %action,
                target = %operation.target,
                "No timing context at completion, skipping observation"
            );
            return Completion::Skipped;
        };

        let elapsed = timing.elapsed();
        let labels = self.deriver.derive(operation, action);

        if let Err(e) = self.sink.observe(&labels, elapsed) {
            error!(
                error = %e,
                action = %action,
                name = %timing.name(),
                "Failed to record operation observation"
            );
            return Completion::Rejected;
        }

        trace!(
            action = %action,
            labels = ?labels.values(),
            elapsed_secs = elapsed.as_secs_f64(),
            "Recorded operation observation"
        );
        Completion::Observed(elapsed)
    }

    /// Hook registrations for every action kind: one before and one after
    /// hook each.
    #[must_use]
    pub fn hook_registrations(&self) -> Vec<HookRegistration> {
        let start_name = format!("{HOOK_PREFIX}:start");
        let mut hooks = Vec::with_capacity(ActionKind::ALL.len() * 2);

        for action in ActionKind::ALL {
            let core = self.clone();
            hooks.push(HookRegistration::before(action, start_name.clone(), move |op| {
                core.before(op);
            }));
        }
        for action in ActionKind::ALL {
            let core = self.clone();
            hooks.push(HookRegistration::after(
                action,
                format!("{HOOK_PREFIX}:{action}"),
                move |op| {
                    core.after(op, action);
                },
            ));
        }
        hooks
    }

    /// Attach the hooks to a host pipeline, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns the host's registration error (closed pipeline, name
    /// collision); no hook is left registered in that case.
    pub fn install<R>(&self, host: &mut R) -> Result<()>
    where
        R: HookRegistry + ?Sized,
    {
        host.register_all(self.hook_registrations())?;
        info!(
            actions = ActionKind::ALL.len(),
            labels = ?self.sink.label_names(),
            "Operation instrumentation installed"
        );
        Ok(())
    }
}

impl fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumentation")
            .field("labels", &self.sink.label_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::context::{with_name, InvocationContext};
    use crate::labels::{FnLabelDeriver, LabelSet};
    use crate::pipeline::{HookError, OperationPipeline, Phase};
    use crate::sink::SinkError;
    use std::sync::Mutex;
    use std::thread;

    #[derive(Default)]
    struct VecSink {
        samples: Mutex<Vec<(Vec<String>, Duration)>>,
    }

    impl ObservationSink for VecSink {
        fn label_names(&self) -> &[&'static str] {
            &crate::labels::DEFAULT_LABEL_NAMES
        }

        fn observe(&self, labels: &LabelSet, duration: Duration) -> std::result::Result<(), SinkError> {
            if labels.len() != self.label_names().len() {
                return Err(SinkError::LabelArity {
                    metric: "vec".to_string(),
                    expected: self.label_names().len(),
                    actual: labels.len(),
                });
            }
            self.samples
                .lock()
                .unwrap()
                .push((labels.values().to_vec(), duration));
            Ok(())
        }
    }

    fn core() -> (Instrumentation, Arc<VecSink>) {
        let sink = Arc::new(VecSink::default());
        let core = Instrumentation::with_default_labels(sink.clone()).unwrap();
        (core, sink)
    }

    #[test]
    fn test_before_attaches_default_timing() {
        let (core, _) = core();
        let mut op = Operation::new(InvocationContext::background(), "people");

        core.before(&mut op);

        assert_eq!(
            op.context.timing().map(TimingContext::name),
            Some(DEFAULT_OPERATION_NAME)
        );
    }

    #[test]
    fn test_before_keeps_caller_name_and_restarts_clock() {
        let (core, _) = core();
        let mut op = Operation::new(with_name("nightly_report"), "people");
        let tagged_at = op.context.timing().unwrap().start();
        thread::sleep(Duration::from_millis(5));

        core.before(&mut op);

        let timing = op.context.timing().unwrap();
        assert_eq!(timing.name(), "nightly_report");
        assert!(timing.start() > tagged_at);
    }

    #[test]
    fn test_last_before_hook_wins_start_time() {
        let (core, _) = core();
        let mut op = Operation::new(InvocationContext::background(), "people");

        core.before(&mut op);
        thread::sleep(Duration::from_millis(50));
        core.before(&mut op);

        match core.after(&op, ActionKind::Query) {
            Completion::Observed(elapsed) => assert!(elapsed < Duration::from_millis(50)),
            other => panic!("expected observation, got {other:?}"),
        }
    }

    #[test]
    fn test_after_without_timing_is_skipped() {
        let (core, sink) = core();
        let op = Operation::new(InvocationContext::background(), "people");

        assert_eq!(core.after(&op, ActionKind::Query), Completion::Skipped);
        assert!(sink.samples.lock().unwrap().is_empty());
    }

    #[test]
    fn test_after_records_labels_and_duration() {
        let (core, sink) = core();
        let mut op = Operation::new(InvocationContext::background(), "People");
        core.before(&mut op);
        thread::sleep(Duration::from_millis(10));
        op.error = Some("not found".into());

        let completion = core.after(&op, ActionKind::Query);

        let samples = sink.samples.lock().unwrap();
        assert_eq!(samples.len(), 1);
        let (labels, duration) = samples.first().unwrap();
        assert_eq!(labels, &["default", "query", "people", "0", "error"]);
        assert!(*duration >= Duration::from_millis(10));
        assert_eq!(completion, Completion::Observed(*duration));
        // the host's error is left in place
        assert!(op.is_error());
    }

    #[test]
    fn test_schema_mismatch_rejected_at_construction() {
        let sink = Arc::new(VecSink::default());
        let deriver = Arc::new(FnLabelDeriver::new(&["action"], |_: &Operation, action| {
            LabelSet::from(&[action.as_str()][..])
        }));

        let err = Instrumentation::new(sink, deriver).unwrap_err();
        assert!(matches!(err, OpMetricsError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_deriver_arity_bug_is_rejected_not_raised() {
        let sink = Arc::new(VecSink::default());
        // declares the right schema but emits a short tuple
        let deriver = Arc::new(FnLabelDeriver::new(
            &crate::labels::DEFAULT_LABEL_NAMES,
            |_: &Operation, action| LabelSet::from(&[action.as_str()][..]),
        ));
        let core = Instrumentation::new(sink.clone(), deriver).unwrap();
        let mut op = Operation::new(InvocationContext::background(), "people");
        core.before(&mut op);

        assert_eq!(core.after(&op, ActionKind::Raw), Completion::Rejected);
        assert!(sink.samples.lock().unwrap().is_empty());
    }

    #[test]
    fn test_install_registers_one_pair_per_action() {
        let (core, _) = core();
        let mut pipeline = OperationPipeline::new();

        core.install(&mut pipeline).unwrap();

        for action in ActionKind::ALL {
            assert_eq!(
                pipeline.hook_names(action, Phase::Before),
                ["op-metrics:start"]
            );
            assert_eq!(
                pipeline.hook_names(action, Phase::After),
                [format!("op-metrics:{action}")]
            );
        }
    }

    #[test]
    fn test_install_twice_fails_without_partial_registration() {
        let (core, _) = core();
        let mut pipeline = OperationPipeline::new();
        core.install(&mut pipeline).unwrap();

        let err = core.install(&mut pipeline).unwrap_err();
        assert!(matches!(
            err,
            OpMetricsError::HookRegistration(HookError::Duplicate { .. })
        ));
        assert_eq!(pipeline.hook_names(ActionKind::Query, Phase::Before).len(), 1);
    }

    #[test]
    fn test_install_on_closed_pipeline_fails() {
        let (core, _) = core();
        let mut pipeline = OperationPipeline::new();
        pipeline.close();

        let err = core.install(&mut pipeline).unwrap_err();
        assert!(matches!(
            err,
            OpMetricsError::HookRegistration(HookError::Closed)
        ));
    }

    #[test]
    fn test_installed_hooks_observe_executed_operations() {
        let (core, sink) = core();
        let mut pipeline = OperationPipeline::new();
        core.install(&mut pipeline).unwrap();

        let mut op = Operation::new(with_name("my_update"), "things");
        pipeline.execute(ActionKind::Update, &mut op, |_| Ok(()));

        let samples = sink.samples.lock().unwrap();
        let labels: Vec<&Vec<String>> = samples.iter().map(|(l, _)| l).collect();
        assert_eq!(
            labels,
            [&vec![
                "my_update".to_string(),
                "update".to_string(),
                "things".to_string(),
                "0".to_string(),
                "success".to_string(),
            ]]
        );
    }
}
