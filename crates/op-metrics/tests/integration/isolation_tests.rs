//! Per-invocation isolation, naming and outcome properties, checked with a
//! recording sink shared across threads.

use op_metrics::context::DEFAULT_OPERATION_NAME;
use op_metrics::pipeline::HookRegistration;
use op_metrics::{
    with_name, with_name_context, ActionKind, Completion, HookRegistry, Instrumentation,
    InvocationContext, Operation, OperationPipeline,
};
use op_metrics_test_utils::{MemoryStore, RecordingSink};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn recording() -> (Arc<RecordingSink>, Instrumentation) {
    let sink = Arc::new(RecordingSink::with_default_labels());
    let instrumentation = Instrumentation::with_default_labels(sink.clone()).unwrap();
    (sink, instrumentation)
}

#[test]
fn test_concurrent_invocations_keep_their_own_names() {
    const THREADS: usize = 8;
    const CALLS: usize = 25;

    let (sink, instrumentation) = recording();
    let store = Arc::new(MemoryStore::instrumented(&instrumentation));
    store.migrate("items");
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let ctx = with_name(format!("caller_{i}"));
                barrier.wait();
                for _ in 0..CALLS {
                    store.find(&ctx, "items", &[]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(sink.len(), THREADS * CALLS);
    for i in 0..THREADS {
        let name = format!("caller_{i}");
        assert_eq!(
            sink.count(&[name.as_str(), "query", "items", "0", "success"]),
            CALLS,
            "{name} observations were mislabeled"
        );
    }
    assert_eq!(
        sink.count(&[DEFAULT_OPERATION_NAME, "query", "items", "0", "success"]),
        0
    );
}

#[test]
fn test_one_context_shared_by_threads_is_not_mutated() {
    let (sink, instrumentation) = recording();
    let store = Arc::new(MemoryStore::instrumented(&instrumentation));
    store.migrate("items");
    let ctx = with_name("shared");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let ctx = ctx.clone();
            thread::spawn(move || store.count(&ctx, "items").unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(sink.count(&["shared", "row", "items", "0", "success"]), 4);
    assert_eq!(ctx.timing().unwrap().name(), "shared");
}

#[test]
fn test_unnamed_invocation_uses_default_name() {
    let (sink, instrumentation) = recording();
    let store = MemoryStore::instrumented(&instrumentation);
    store.migrate("items");

    store.count(&InvocationContext::background(), "items").unwrap();

    assert_eq!(
        sink.count(&[DEFAULT_OPERATION_NAME, "row", "items", "0", "success"]),
        1
    );
}

#[test]
fn test_caller_context_is_left_untagged() {
    let (_sink, instrumentation) = recording();
    let store = MemoryStore::instrumented(&instrumentation);
    store.migrate("items");
    let ctx = InvocationContext::background();

    store.find(&ctx, "items", &[]).unwrap();

    // the store works on a copy; the caller's context never gains timing
    assert!(ctx.timing().is_none());
}

#[test]
fn test_renamed_context_overrides_parent_name() {
    let (sink, instrumentation) = recording();
    let store = MemoryStore::instrumented(&instrumentation);
    store.migrate("items");

    let parent = with_name("outer");
    let child = with_name_context(&parent, "inner");
    store.count(&child, "items").unwrap();
    store.count(&parent, "items").unwrap();

    assert_eq!(sink.count(&["inner", "row", "items", "0", "success"]), 1);
    assert_eq!(sink.count(&["outer", "row", "items", "0", "success"]), 1);
}

#[test]
fn test_both_outcomes_are_counted() {
    let (sink, instrumentation) = recording();
    let store = MemoryStore::instrumented(&instrumentation);
    store.migrate("items");
    let ctx = with_name("lookup");

    store.first(&ctx, "items", &[]).unwrap_err();
    store.create(&ctx, "items", &[]).unwrap();
    store.first(&ctx, "items", &[]).unwrap();

    assert_eq!(sink.count(&["lookup", "query", "items", "0", "error"]), 1);
    assert_eq!(sink.count(&["lookup", "query", "items", "0", "success"]), 1);
}

#[test]
fn test_short_circuited_operation_is_observed_as_error() {
    let (sink, instrumentation) = recording();
    let mut store = MemoryStore::new();
    store.instrument(&instrumentation).unwrap();
    store
        .pipeline_mut()
        .register(HookRegistration::before(ActionKind::Delete, "guard", |op| {
            op.error = Some("deletes are disabled".into());
        }))
        .unwrap();
    store.migrate("items");
    let id = store.create(&InvocationContext::background(), "items", &[]).unwrap();

    let err = store
        .delete(&InvocationContext::background(), "items", id)
        .unwrap_err();

    assert!(err.to_string().contains("deletes are disabled"));
    assert_eq!(
        sink.count(&[DEFAULT_OPERATION_NAME, "delete", "items", "0", "error"]),
        1
    );
    assert_eq!(store.count(&InvocationContext::background(), "items").unwrap(), 1);
}

#[test]
fn test_after_hook_without_timing_records_nothing() {
    let (sink, instrumentation) = recording();
    let mut pipeline = OperationPipeline::new();
    instrumentation.install(&mut pipeline).unwrap();
    // runs after the start hook and throws its timing away
    pipeline
        .register(HookRegistration::before(ActionKind::Query, "strip", |op| {
            op.context = op.context.detached();
        }))
        .unwrap();

    let mut op = Operation::new(with_name("lost"), "items");
    pipeline.execute(ActionKind::Query, &mut op, |_| Ok(()));

    assert!(!op.is_error());
    assert!(sink.is_empty());
    assert_eq!(instrumentation.after(&op, ActionKind::Query), Completion::Skipped);
}

#[test]
fn test_last_before_hook_sets_start_time() {
    let (sink, instrumentation) = recording();
    let mut pipeline = OperationPipeline::new();
    pipeline
        .register(HookRegistration::before(ActionKind::Query, "slow", |_| {
            thread::sleep(Duration::from_millis(50));
        }))
        .unwrap();
    instrumentation.install(&mut pipeline).unwrap();

    // a second start hook from another owner of the same core
    let core = instrumentation.clone();
    pipeline
        .register_all(vec![HookRegistration::before(
            ActionKind::Query,
            "restart",
            move |op| core.before(op),
        )])
        .unwrap();

    let mut op = Operation::new(InvocationContext::background(), "items");
    pipeline.execute(ActionKind::Query, &mut op, |_| Ok(()));

    let observations = sink.observations();
    let observation = observations.first().unwrap();
    assert_eq!(observations.len(), 1);
    // the slow hook ran before both start hooks and is not included
    assert!(observation.duration < Duration::from_millis(50));
}
