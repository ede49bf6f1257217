//! Process-wide default instrumentation.

use op_metrics::default::build_default;
use op_metrics::observability::exporter::build_metrics_recorder;
use op_metrics::registry::MetricRegistry;
use op_metrics::sink::DEFAULT_METRIC_NAME;
use op_metrics::{
    default_instrumentation, ActionKind, HistogramSpec, InvocationContext, Operation,
};
use op_metrics_test_utils::{capture_metrics, default_labels, MemoryStore};
use std::sync::Arc;
use std::thread;

#[test]
fn test_repeated_acquisition_returns_one_instance() {
    let first = default_instrumentation().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| thread::spawn(default_instrumentation))
        .collect();
    for handle in handles {
        let instance = handle.join().unwrap().unwrap();
        assert!(std::ptr::eq(instance, first));
        assert!(Arc::ptr_eq(instance.sink(), first.sink()));
    }

    assert_eq!(
        MetricRegistry::global().get(DEFAULT_METRIC_NAME),
        Some(HistogramSpec::default())
    );
}

#[test]
fn test_default_instance_can_instrument_many_stores() {
    let core = default_instrumentation().unwrap();

    let snapshot = capture_metrics(|| {
        for _ in 0..3 {
            let store = MemoryStore::instrumented(core);
            store.migrate("items");
            store.count(&InvocationContext::background(), "items").unwrap();
        }
    });

    snapshot.assert_count(
        DEFAULT_METRIC_NAME,
        &default_labels("default", "row", "items", "0", "success"),
        3,
    );
}

#[test]
fn test_default_shape_reuses_existing_registration() {
    let registry = MetricRegistry::new();
    registry.register(&HistogramSpec::default()).unwrap();

    build_default(&registry).unwrap();
    assert_eq!(registry.specs().len(), 1);
}

#[test]
fn test_default_instance_acquired_after_exporter_is_a_histogram() {
    let recorder = build_metrics_recorder(MetricRegistry::global()).unwrap();
    let handle = recorder.handle();
    let core = default_instrumentation().unwrap();

    metrics::with_local_recorder(&recorder, || {
        let mut op = Operation::new(InvocationContext::background(), "items");
        core.before(&mut op);
        core.after(&op, ActionKind::Delete);
    });

    let rendered = handle.render();
    let bucket_prefix = format!("{DEFAULT_METRIC_NAME}_bucket{{");
    assert!(
        rendered
            .lines()
            .any(|l| l.starts_with(&bucket_prefix) && l.contains("action=\"delete\"")),
        "{rendered}"
    );
    assert!(!rendered.contains("quantile="), "{rendered}");
}
