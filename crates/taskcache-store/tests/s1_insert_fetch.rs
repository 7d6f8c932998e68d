//! S1: insert into a fixed collection, fetch it back finished.

mod support;

use serde_json::json;
use taskcache_core::{Collection, Reference, Runtime};

#[test]
fn insert_and_fetch_fixed_collection() {
    let ts = support::temp_store();
    let runtime = Runtime::new(ts.store.clone());
    runtime.register_collection(Collection::fixed("hello")).unwrap();
    let executor = runtime.register_executor("test", "0.1", 30.0, json!({})).unwrap();

    let reference = Reference::new("hello", json!("e1"));
    runtime.insert(&reference, json!("ABC")).unwrap();

    let entry = runtime.get_entry(&reference).unwrap().expect("entry exists");
    assert_eq!(entry.value, Some(json!("ABC")));
    assert!(entry.is_finished());
    assert!(entry.created.is_some());

    runtime.unregister_executor(&executor).unwrap();
}

#[test]
fn fixed_collection_rejects_compute() {
    let ts = support::temp_store();
    let runtime = Runtime::new(ts.store.clone());
    runtime.register_collection(Collection::fixed("hello")).unwrap();
    let executor = runtime.register_executor("test", "0.1", 30.0, json!({})).unwrap();

    let reference = Reference::new("hello", json!("missing"));
    let err = runtime.compute(&reference).unwrap_err();
    assert!(matches!(err, taskcache_core::CoreError::FixedCollectionMiss { .. }));

    runtime.unregister_executor(&executor).unwrap();
}
