//! S3: a dependency function that returns the same reference twice collapses
//! to a single shared task/entry.

mod support;

use serde_json::{json, Value};
use taskcache_core::{Collection, Reference, Runtime, Store};

#[test]
fn shared_dependency_is_announced_once() {
    let ts = support::temp_store();
    let runtime = Runtime::new(ts.store.clone());

    runtime
        .register_collection(Collection::computed(
            "sleepers",
            Box::new(|config: &Value, _deps: &[Value]| Ok(json!(config.as_i64().unwrap() * 2))),
            None,
        ))
        .unwrap();
    runtime
        .register_collection(Collection::computed(
            "bedrooms",
            Box::new(|_config: &Value, deps: &[Value]| Ok(json!(deps))),
            Some(Box::new(|_config: &Value| {
                vec![Reference::new("sleepers", json!(0)), Reference::new("sleepers", json!(1)), Reference::new("sleepers", json!(0))]
            })),
        ))
        .unwrap();
    let executor = runtime.register_executor("test", "0.1", 30.0, json!({})).unwrap();

    let root = Reference::new("bedrooms", json!("any"));
    runtime.compute(&root).unwrap();

    let sleepers_0 = Reference::new("sleepers", json!(0));
    let entry = runtime.get_entry(&sleepers_0).unwrap().unwrap();
    assert_eq!(entry.value, Some(json!(0)));

    let summaries = ts.store.as_ref().entry_summaries("sleepers").unwrap();
    assert_eq!(summaries.len(), 2, "sleepers(0) must appear exactly once despite two dependency edges to it");

    runtime.unregister_executor(&executor).unwrap();
}
