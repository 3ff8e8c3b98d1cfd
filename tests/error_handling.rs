//! Error handling and teardown tests.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use store_sync::{
    Backend, BindOptions, KeySets, KeyValueSubstrate, ManualScheduler, MemoryLocation,
    MemoryStorage, ReactiveStore, Snapshot, SubstrateError, SyncContext, SyncError, SyncEvent,
    WriteOutcome,
};

struct Harness {
    location: Arc<MemoryLocation>,
    durable: Arc<MemoryStorage>,
    session: Arc<MemoryStorage>,
    scheduler: Arc<ManualScheduler>,
    ctx: SyncContext,
}

fn harness_with(scheduler: ManualScheduler) -> Harness {
    let location = Arc::new(MemoryLocation::new());
    let durable = Arc::new(MemoryStorage::new());
    let session = Arc::new(MemoryStorage::new());
    let scheduler = Arc::new(scheduler);

    let ctx = SyncContext::builder()
        .location(location.clone())
        .durable(durable.clone())
        .session(session.clone())
        .scheduler(scheduler.clone())
        .build();

    Harness {
        location,
        durable,
        session,
        scheduler,
        ctx,
    }
}

fn harness() -> Harness {
    harness_with(ManualScheduler::new())
}

fn snapshot(value: Value) -> Snapshot {
    Snapshot::from_value(value).unwrap()
}

fn bind_prefs(h: &Harness) -> store_sync::BoundStore<store_sync::MemoryStore> {
    h.ctx
        .bind(
            "prefs",
            KeySets::new()
                .navigation(["theme"])
                .durable(["theme"])
                .session(["theme"]),
            snapshot(json!({"theme": "light"})),
            BindOptions::default(),
        )
        .unwrap()
}

fn total_writes(h: &Harness) -> usize {
    h.location.write_count() + h.durable.write_count() + h.session.write_count()
}

// --- Binding Conflicts ---

#[test]
fn test_conflict_in_same_backend() {
    let h = harness();
    let _first = h
        .ctx
        .bind("cart", KeySets::new().durable(["items"]), Snapshot::new(), BindOptions::default())
        .unwrap();

    let result = h
        .ctx
        .bind("cart", KeySets::new().durable(["total"]), Snapshot::new(), BindOptions::default());

    match result {
        Err(SyncError::BindingConflict { name, backend }) => {
            assert_eq!(name, "cart");
            assert_eq!(backend, Backend::Durable);
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("second bind should have been rejected"),
    }
}

#[test]
fn test_conflict_message_names_store_and_backend() {
    let h = harness();
    let _first = h
        .ctx
        .bind("cart", KeySets::new().session(["items"]), Snapshot::new(), BindOptions::default())
        .unwrap();

    let err = h
        .ctx
        .bind("cart", KeySets::new().session(["items"]), Snapshot::new(), BindOptions::default())
        .err()
        .unwrap();

    let message = err.to_string();
    assert!(message.contains("cart"));
    assert!(message.contains("session"));
}

#[test]
fn test_same_name_across_backends_is_allowed() {
    let h = harness();
    let _nav = h
        .ctx
        .bind("cart", KeySets::new().navigation(["page"]), Snapshot::new(), BindOptions::default())
        .unwrap();
    let _durable = h
        .ctx
        .bind("cart", KeySets::new().durable(["items"]), Snapshot::new(), BindOptions::default())
        .unwrap();

    assert!(h.ctx.is_bound(&"cart".into(), Backend::Navigation));
    assert!(h.ctx.is_bound(&"cart".into(), Backend::Durable));
    assert!(!h.ctx.is_bound(&"cart".into(), Backend::Session));
}

#[test]
fn test_rejected_bind_reserves_nothing() {
    let h = harness();
    let _first = h
        .ctx
        .bind("cart", KeySets::new().durable(["items"]), Snapshot::new(), BindOptions::default())
        .unwrap();

    let result = h.ctx.bind(
        "cart",
        KeySets::new().session(["draft"]).durable(["items"]),
        Snapshot::new(),
        BindOptions::default(),
    );

    assert!(result.is_err());
    assert!(!h.ctx.is_bound(&"cart".into(), Backend::Session));
}

#[test]
fn test_empty_key_set_declares_nothing() {
    let h = harness();
    let _first = h
        .ctx
        .bind("cart", KeySets::new().durable(["items"]), Snapshot::new(), BindOptions::default())
        .unwrap();

    let second = h.ctx.bind(
        "cart",
        KeySets::new().durable(Vec::<String>::new()).session(["draft"]),
        Snapshot::new(),
        BindOptions::default(),
    );

    assert!(second.is_ok());
}

#[test]
fn test_destroyed_name_stays_reserved_until_reset() {
    let h = harness();
    let first = bind_prefs(&h);
    first.destroy();

    assert!(matches!(
        h.ctx.bind("prefs", KeySets::new().durable(["theme"]), Snapshot::new(), BindOptions::default()),
        Err(SyncError::BindingConflict { .. })
    ));

    h.ctx.reset();
    assert!(h
        .ctx
        .bind("prefs", KeySets::new().durable(["theme"]), Snapshot::new(), BindOptions::default())
        .is_ok());
}

#[test]
fn test_contexts_are_independent() {
    let a = SyncContext::detached();
    let b = SyncContext::detached();

    let _x = a
        .bind("shared", KeySets::new().durable(["k"]), Snapshot::new(), BindOptions::default())
        .unwrap();
    assert!(b
        .bind("shared", KeySets::new().durable(["k"]), Snapshot::new(), BindOptions::default())
        .is_ok());
}

// --- Corrupted Payloads ---

#[test]
fn test_corrupted_payload_falls_back_to_defaults() {
    let h = harness();
    h.durable.seed("prefs", "{not json");
    h.session.seed("prefs", r#"["an", "array"]"#);

    let prefs = h
        .ctx
        .bind(
            "prefs",
            KeySets::new().durable(["theme"]).session(["theme"]),
            snapshot(json!({"theme": "light"})),
            BindOptions::default(),
        )
        .unwrap();

    assert_eq!(prefs.get().get("theme"), Some(&json!("light")));
}

#[test]
fn test_corrupted_backend_does_not_hide_others() {
    let h = harness();
    h.session.seed("prefs", "garbage");
    h.durable.seed("prefs", r#"{"theme":"dark"}"#);

    let prefs = h
        .ctx
        .bind(
            "prefs",
            KeySets::new().durable(["theme"]).session(["theme"]),
            snapshot(json!({"theme": "light"})),
            BindOptions::default(),
        )
        .unwrap();

    assert_eq!(prefs.get().get("theme"), Some(&json!("dark")));
}

#[test]
fn test_bad_encoded_query_parameter_is_ignored() {
    let location = Arc::new(MemoryLocation::with_search("prefs=%21%21%21&prefs_encoded=1"));
    let ctx = SyncContext::builder().location(location).build();

    let prefs = ctx
        .bind(
            "prefs",
            KeySets::new().navigation(["theme"]),
            snapshot(json!({"theme": "light"})),
            BindOptions::default(),
        )
        .unwrap();

    assert_eq!(prefs.get().get("theme"), Some(&json!("light")));
}

#[test]
fn test_invalid_options_json() {
    assert!(matches!(
        BindOptions::from_json(r#"{"priority": ["navigation", "navigation"]}"#),
        Err(SyncError::InvalidOptions(_))
    ));
}

// --- Write Failures ---

#[test]
fn test_quota_failure_is_reported_and_retried() {
    let h = harness();
    let events = h.ctx.subscribe_events();
    let notes = h
        .ctx
        .bind(
            "notes",
            KeySets::new().durable(["text"]).session(["text"]),
            snapshot(json!({"text": ""})),
            BindOptions::default(),
        )
        .unwrap();
    events.drain();

    h.durable.set_quota(Some(8));
    notes.set(snapshot(json!({"text": "a long note"})));
    let report = notes.flush_now();

    assert!(matches!(
        report.outcome(Backend::Durable),
        Some(WriteOutcome::Failed(SubstrateError::QuotaExceeded { .. }))
    ));
    // Other backends are unaffected
    assert!(report.outcome(Backend::Session).unwrap().is_written());
    assert!(h.durable.get_item("notes").is_none());

    let failed: Vec<_> = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, SyncEvent::WriteFailed { .. }))
        .collect();
    assert_eq!(failed.len(), 1);

    // Same value again: durable still differs from its last persisted value
    h.durable.set_quota(None);
    notes.set(snapshot(json!({"text": "a long note"})));
    h.scheduler.advance(Duration::from_millis(100));

    assert_eq!(h.durable.get_item("notes").as_deref(), Some(r#"{"text":"a long note"}"#));
    assert_eq!(h.session.write_count(), 1);
}

#[test]
fn test_store_keeps_value_when_writes_fail() {
    let h = harness();
    h.durable.set_quota(Some(0));
    let prefs = bind_prefs(&h);

    prefs.set(snapshot(json!({"theme": "dark"})));
    h.scheduler.advance(Duration::from_millis(100));

    assert_eq!(prefs.get().get("theme"), Some(&json!("dark")));
    assert!(!prefs.has_pending_flush());
}

// --- Teardown ---

#[test]
fn test_no_writes_after_destroy() {
    let h = harness();
    let prefs = bind_prefs(&h);

    prefs.set(snapshot(json!({"theme": "dark"})));
    assert!(prefs.has_pending_flush());
    prefs.destroy();

    assert!(prefs.is_destroyed());
    assert_eq!(h.scheduler.pending(), 0);

    prefs.set(snapshot(json!({"theme": "blue"})));
    h.scheduler.run_all();
    assert_eq!(total_writes(&h), 0);
    assert_eq!(prefs.get().get("theme"), Some(&json!("blue")));
}

#[test]
fn test_timer_racing_destroy_writes_nothing() {
    let h = harness_with(ManualScheduler::ignoring_cancel());
    let prefs = bind_prefs(&h);

    prefs.set(snapshot(json!({"theme": "dark"})));
    prefs.destroy();

    // The cancelled timer still fires
    assert_eq!(h.scheduler.pending(), 1);
    assert_eq!(h.scheduler.run_all(), 1);
    assert_eq!(total_writes(&h), 0);
}

#[test]
fn test_superseded_timer_that_fires_anyway_writes_nothing() {
    let h = harness_with(ManualScheduler::ignoring_cancel());
    let prefs = bind_prefs(&h);

    prefs.set(snapshot(json!({"theme": "dark"})));
    h.scheduler.advance(Duration::from_millis(50));
    prefs.set(snapshot(json!({"theme": "blue"})));

    // First timer fires at 100 but is stale
    h.scheduler.advance(Duration::from_millis(50));
    assert_eq!(total_writes(&h), 0);

    h.scheduler.advance(Duration::from_millis(50));
    assert_eq!(h.durable.write_count(), 1);
    assert_eq!(h.durable.get_item("prefs").as_deref(), Some(r#"{"theme":"blue"}"#));
}

#[test]
fn test_destroy_is_idempotent() {
    let h = harness();
    let events = h.ctx.subscribe_events();
    let prefs = bind_prefs(&h);

    prefs.destroy();
    prefs.destroy();
    drop(prefs);

    let destroyed = events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, SyncEvent::Destroyed { .. }))
        .count();
    assert_eq!(destroyed, 1);
}

#[test]
fn test_drop_releases_subscription_and_timer() {
    let h = harness();
    let store = Arc::new(store_sync::MemoryStore::new(snapshot(json!({"theme": "light"}))));

    let bound = h
        .ctx
        .bind_store("prefs", KeySets::new().durable(["theme"]), store.clone(), BindOptions::default())
        .unwrap();
    assert_eq!(store.listener_count(), 1);

    store.set(snapshot(json!({"theme": "dark"})));
    drop(bound);

    assert_eq!(store.listener_count(), 0);
    assert_eq!(h.scheduler.pending(), 0);
    h.scheduler.run_all();
    assert_eq!(h.durable.write_count(), 0);
}

#[test]
fn test_flush_now_after_destroy_is_empty() {
    let h = harness();
    let prefs = bind_prefs(&h);

    prefs.set(snapshot(json!({"theme": "dark"})));
    prefs.destroy();

    assert!(prefs.flush_now().outcomes.is_empty());
    assert_eq!(total_writes(&h), 0);
}

#[test]
fn test_failing_location_reports_rejection() {
    struct BrokenLocation;

    impl store_sync::LocationSubstrate for BrokenLocation {
        fn search(&self) -> String {
            String::new()
        }

        fn push(&self, _search: &str) -> Result<(), SubstrateError> {
            Err(SubstrateError::Rejected("history is frozen".into()))
        }

        fn replace(&self, _search: &str) -> Result<(), SubstrateError> {
            Err(SubstrateError::Rejected("history is frozen".into()))
        }
    }

    let ctx = SyncContext::builder().location(Arc::new(BrokenLocation)).build();
    let events = ctx.subscribe_events();
    let store = ctx
        .bind("tabs", KeySets::new().navigation(["tab"]), snapshot(json!({"tab": 1})), BindOptions::default())
        .unwrap();

    store.set(snapshot(json!({"tab": 2})));
    let report = store.flush_now();

    assert!(matches!(
        report.outcome(Backend::Navigation),
        Some(WriteOutcome::Failed(SubstrateError::Rejected(_)))
    ));
    assert!(events.drain().iter().any(|e| matches!(
        e,
        SyncEvent::WriteFailed { backend: Backend::Navigation, .. }
    )));
    assert_eq!(store.store().get().get("tab"), Some(&json!(2)));
}
