//! S6: removing an entry cascades to every entry that transitively depends
//! on it.

mod support;

use serde_json::{json, Value};
use taskcache_core::{Collection, Reference, Runtime};

#[test]
fn removing_a_dependency_removes_its_dependents() {
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
            Some(Box::new(|config: &Value| {
                config["sleepers"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|n| Reference::new("sleepers", n.clone()))
                    .collect()
            })),
        ))
        .unwrap();
    let executor = runtime.register_executor("test", "0.1", 30.0, json!({})).unwrap();

    let bedrooms_ref = Reference::new("bedrooms", json!({"sleepers": [1, 2]}));
    runtime.compute(&bedrooms_ref).unwrap();
    assert!(runtime.get_entry(&bedrooms_ref).unwrap().unwrap().is_finished());

    let sleepers_1 = Reference::new("sleepers", json!(1));
    assert!(runtime.get_entry(&sleepers_1).unwrap().unwrap().is_finished());

    runtime.remove_entry(&sleepers_1).unwrap();

    assert!(runtime.get_entry(&sleepers_1).unwrap().is_none());
    assert!(runtime.get_entry(&bedrooms_ref).unwrap().is_none(), "removing a dependency must cascade to its dependents");

    // The unrelated sleepers(2) entry, which bedrooms also depended on, is
    // untouched by removing sleepers(1).
    let sleepers_2 = Reference::new("sleepers", json!(2));
    assert!(runtime.get_entry(&sleepers_2).unwrap().is_some());

    runtime.unregister_executor(&executor).unwrap();
}
