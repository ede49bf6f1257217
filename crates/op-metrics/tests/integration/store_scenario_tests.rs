//! End-to-end scenarios against an instrumented in-memory store.
//!
//! Observations are recorded through the `metrics` facade into a
//! thread-local debugging recorder.

use op_metrics::sink::DEFAULT_METRIC_NAME;
use op_metrics::{with_name, HistogramSink, HistogramSpec, Instrumentation, InvocationContext};
use op_metrics_test_utils::{capture_metrics, default_labels, MemoryStore, StoreError};
use std::sync::Arc;

fn instrumentation() -> Instrumentation {
    let sink = HistogramSink::new(HistogramSpec::default()).unwrap();
    Instrumentation::with_default_labels(Arc::new(sink)).unwrap()
}

fn bg() -> InvocationContext {
    InvocationContext::background()
}

#[test]
fn test_repeated_reads_are_counted_under_default_name() {
    let snapshot = capture_metrics(|| {
        let store = MemoryStore::instrumented(&instrumentation());
        store.migrate("items");
        store.create(&bg(), "items", &[("name", "widget")]).unwrap();

        for _ in 0..10 {
            let row = store.first(&bg(), "items", &[]).unwrap();
            assert_eq!(row.get("name"), Some("widget"));
        }
    });

    snapshot
        .assert_count(
            DEFAULT_METRIC_NAME,
            &default_labels("default", "query", "items", "0", "success"),
            10,
        )
        .assert_count(
            DEFAULT_METRIC_NAME,
            &default_labels("default", "create", "items", "0", "success"),
            1,
        );
}

#[test]
fn test_failed_read_is_counted_as_error_only() {
    let snapshot = capture_metrics(|| {
        let store = MemoryStore::instrumented(&instrumentation());
        store.migrate("people");
        let id = store.create(&bg(), "people", &[("name", "Joe")]).unwrap();
        store.first(&bg(), "people", &[]).unwrap();
        store.delete(&bg(), "people", id).unwrap();

        assert_eq!(
            store.first(&bg(), "people", &[]),
            Err(StoreError::RecordNotFound)
        );
    });

    snapshot
        .assert_count(
            DEFAULT_METRIC_NAME,
            &default_labels("default", "query", "people", "0", "error"),
            1,
        )
        .assert_count(
            DEFAULT_METRIC_NAME,
            &default_labels("default", "query", "people", "0", "success"),
            1,
        )
        .assert_count(
            DEFAULT_METRIC_NAME,
            &default_labels("default", "delete", "people", "0", "success"),
            1,
        );
}

#[test]
fn test_missing_table_is_an_error_outcome() {
    let snapshot = capture_metrics(|| {
        let store = MemoryStore::instrumented(&instrumentation());
        assert!(store.find(&bg(), "ghosts", &[]).is_err());
    });

    snapshot.assert_count(
        DEFAULT_METRIC_NAME,
        &default_labels("default", "query", "ghosts", "0", "error"),
        1,
    );
}

#[test]
fn test_named_update_is_not_counted_under_default_name() {
    let snapshot = capture_metrics(|| {
        let store = MemoryStore::instrumented(&instrumentation());
        store.migrate("things");
        let id = store.create(&bg(), "things", &[("name", "old")]).unwrap();

        store
            .update(&with_name("my_update"), "things", id, "name", "new name")
            .unwrap();
    });

    snapshot
        .assert_count(
            DEFAULT_METRIC_NAME,
            &default_labels("my_update", "update", "things", "0", "success"),
            1,
        )
        .assert_count(
            DEFAULT_METRIC_NAME,
            &default_labels("default", "update", "things", "0", "success"),
            0,
        );
}

#[test]
fn test_join_count_splits_series() {
    let snapshot = capture_metrics(|| {
        let store = MemoryStore::instrumented(&instrumentation());
        store.migrate("people");
        store.migrate("favorite_colors");
        let person = store.create(&bg(), "people", &[("name", "Jill")]).unwrap();
        let person_id = person.to_string();
        store
            .create(
                &bg(),
                "favorite_colors",
                &[("person_id", person_id.as_str()), ("name", "Red")],
            )
            .unwrap();

        store.first(&bg(), "people", &["favorite_colors"]).unwrap();
        store.first(&bg(), "people", &[]).unwrap();
    });

    snapshot
        .assert_count(
            DEFAULT_METRIC_NAME,
            &default_labels("default", "query", "people", "1", "success"),
            1,
        )
        .assert_count(
            DEFAULT_METRIC_NAME,
            &default_labels("default", "query", "people", "0", "success"),
            1,
        );
}

#[test]
fn test_every_action_kind_is_observed() {
    let snapshot = capture_metrics(|| {
        let store = MemoryStore::instrumented(&instrumentation());
        store.migrate("orders");
        let id = store.create(&bg(), "orders", &[]).unwrap();
        store.find(&bg(), "orders", &[]).unwrap();
        store.update(&bg(), "orders", id, "state", "paid").unwrap();
        store.count(&bg(), "orders").unwrap();
        store.delete(&bg(), "orders", id).unwrap();
        store.raw(&bg(), "TRUNCATE orders").unwrap();
    });

    for action in ["create", "query", "update", "row", "delete"] {
        snapshot.assert_count(
            DEFAULT_METRIC_NAME,
            &default_labels("default", action, "orders", "0", "success"),
            1,
        );
    }
    // raw statements have no target
    snapshot.assert_count(
        DEFAULT_METRIC_NAME,
        &default_labels("default", "raw", "unknown", "0", "success"),
        1,
    );
    assert_eq!(snapshot.total_count(DEFAULT_METRIC_NAME), 6);
}

#[test]
fn test_target_is_lowercased() {
    let snapshot = capture_metrics(|| {
        let store = MemoryStore::instrumented(&instrumentation());
        store.migrate("Invoices");
        store.count(&bg(), "Invoices").unwrap();
    });

    snapshot.assert_count(
        DEFAULT_METRIC_NAME,
        &default_labels("default", "row", "invoices", "0", "success"),
        1,
    );
    assert_eq!(snapshot.series_count(DEFAULT_METRIC_NAME), 1);
}

#[test]
fn test_uninstrumented_store_records_nothing() {
    let snapshot = capture_metrics(|| {
        let store = MemoryStore::new();
        store.migrate("items");
        store.create(&bg(), "items", &[]).unwrap();
    });

    assert_eq!(snapshot.total_count(DEFAULT_METRIC_NAME), 0);
}

#[test]
fn test_recorded_durations_cover_the_work() {
    use op_metrics::pipeline::HookRegistration;
    use op_metrics::ActionKind;
    use std::thread;
    use std::time::Duration;

    let snapshot = capture_metrics(|| {
        let mut store = MemoryStore::new();
        store.instrument(&instrumentation()).unwrap();
        // slow hook running after the timer started
        store
            .pipeline_mut()
            .register(HookRegistration::before(ActionKind::Query, "slow", |_| {
                thread::sleep(Duration::from_millis(20));
            }))
            .unwrap();
        store.migrate("items");
        store.find(&bg(), "items", &[]).unwrap();
    });

    let samples = snapshot.samples(
        DEFAULT_METRIC_NAME,
        &default_labels("default", "query", "items", "0", "success"),
    );
    assert_eq!(samples.len(), 1);
    assert!(samples.iter().all(|s| *s >= 0.020));
}
