//! S5: an executor announces an entry and then "crashes" (no clean stop, no
//! further heartbeat). Once its heartbeat is stale, a second executor's
//! announcement cleans up the abandoned row and completes the build.

mod support;

use serde_json::json;
use taskcache_core::model::ExecutorRecord;
use taskcache_core::store::{NewAnnouncement, Store};
use taskcache_core::{Collection, Reference, Runtime};

#[test]
fn dead_executors_unfinished_entries_are_reclaimed() {
    let ts = support::temp_store();
    let runtime = Runtime::new(ts.store.clone());
    runtime
        .register_collection(Collection::computed(
            "sleepers",
            Box::new(|config: &serde_json::Value, _deps: &[serde_json::Value]| Ok(json!(config.as_i64().unwrap() * 2))),
            None,
        ))
        .unwrap();

    // Executor A: registered straight through the Store (no heartbeat thread,
    // no clean stop) with a heartbeat already far in the past — simulating a
    // crash right after announcing.
    let mut record_a = ExecutorRecord::new("worker", "0.1", 0.01, json!({}));
    record_a.heartbeat = record_a.heartbeat - chrono::Duration::seconds(10);
    let executor_a = ts.store.register_executor(&record_a).unwrap();

    let reference = Reference::new("sleepers", json!(5));
    let announced = ts
        .store
        .announce_entries(
            executor_a,
            &[NewAnnouncement { collection: "sleepers".into(), key: reference.key(), config_bytes: b"5".to_vec() }],
            &[],
        )
        .unwrap();
    assert!(announced);
    // A's heartbeat is already stale, so the row it just created reads back
    // as Missing (reclaimable), not Announced — the whole point of S5.
    assert_eq!(ts.store.get_entry_state("sleepers", &reference.key()).unwrap(), taskcache_core::model::EntryState::Missing);

    // Executor B picks up the same key via the Runtime; A's stale row must
    // not block it, and the build function must run exactly once.
    let executor_b = runtime.register_executor("worker", "0.1", 30.0, json!({})).unwrap();

    let value = runtime.compute(&reference).unwrap();
    assert_eq!(value, json!(10));

    runtime.unregister_executor(&executor_b).unwrap();
}
