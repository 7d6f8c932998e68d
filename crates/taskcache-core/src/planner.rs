//! Reference -> task DAG expansion, and the announce/unannounce steps of the
//! build protocol. The Planner never builds anything itself; it only figures
//! out what is missing and stages it in the Store for a `TaskRunner`.

use std::collections::{HashMap, HashSet};

use crate::errors::CoreError;
use crate::key::canonical_json;
use crate::model::{Collection, EntryState, Reference};
use crate::store::{DepEdge, NewAnnouncement, Store, StoreError};

/// Identity of a task/entry: `(collection, key)`.
pub type TaskKey = (String, String);

/// One node of an expanded DAG: the reference it stands for and its resolved
/// dependency keys, in the order the collection's `DepFn` returned them.
/// Every node that reaches the DAG is, by construction, missing: a finished
/// reference never gets a node, and an announced one fails expansion before
/// any node is built for it (see `expand_into`).
#[derive(Debug, Clone)]
pub struct Task {
    pub reference: Reference,
    pub key: TaskKey,
    pub deps: Vec<TaskKey>,
}

/// A fully expanded dependency DAG, deduplicated by `TaskKey` and ordered so
/// that every task's dependencies appear before it (a valid build order).
#[derive(Debug, Default)]
pub struct TaskDag {
    pub order: Vec<TaskKey>,
    pub tasks: HashMap<TaskKey, Task>,
}

impl TaskDag {
    pub fn get(&self, key: &TaskKey) -> Option<&Task> {
        self.tasks.get(key)
    }

    /// Every node in the DAG, in build order. All of them are missing
    /// entries that must be built in this run; a node is only ever created
    /// for a reference `expand_into` found to be `Missing` (§ Task DAG
    /// properties).
    pub fn missing(&self) -> Vec<&Task> {
        self.order.iter().filter_map(|k| self.tasks.get(k)).collect()
    }

    /// Whether `key` needs building in this run, as opposed to already
    /// being finished (and so having no task node at all).
    pub fn needs_build(&self, key: &TaskKey) -> bool {
        self.tasks.contains_key(key)
    }
}

/// Recursively expands every reference in `targets` into one shared
/// `TaskDag`, following each collection's `DepFn` and consulting the Store
/// for each node's current state before ever touching its dependencies —
/// matching the distilled spec's expansion order (§4.4 step 2): check state
/// first, and only recurse into `DepFn`/fixed-collection validation once the
/// state is confirmed `missing`.
///
/// Fails the whole expansion immediately (no partial DAG returned) the
/// moment any reference resolves to `announced` (no cross-executor
/// rendezvous) or to a missing entry in a fixed collection.
pub fn expand<S: Store>(store: &S, collections: &HashMap<String, Collection>, targets: &[Reference]) -> Result<TaskDag, CoreError> {
    let mut dag = TaskDag::default();
    let mut exists = HashSet::new();
    let mut visiting = HashSet::new();
    for target in targets {
        expand_into(store, collections, target, &mut dag, &mut exists, &mut visiting)?;
    }
    Ok(dag)
}

fn expand_into<S: Store>(
    store: &S,
    collections: &HashMap<String, Collection>,
    reference: &Reference,
    dag: &mut TaskDag,
    exists: &mut HashSet<TaskKey>,
    visiting: &mut HashSet<TaskKey>,
) -> Result<TaskKey, CoreError> {
    let key: TaskKey = (reference.collection.clone(), reference.key());

    if exists.contains(&key) || dag.tasks.contains_key(&key) {
        return Ok(key);
    }
    if !visiting.insert(key.clone()) {
        // Cyclic dependency graph (ruled out by contract, kept as a defensive
        // stop rather than a stack overflow): the cycle surfaces later as a
        // build failure when the runner can never make progress on it.
        return Ok(key);
    }

    // Classify this reference against the Store *before* touching its
    // dependency function at all: a finished entry's historical dependency
    // subtree is never re-walked, and an announced entry fails right here,
    // at the point of discovery, rather than after the whole DAG is built.
    let state = store.get_entry_state(&key.0, &key.1)?;
    match state {
        EntryState::Finished => {
            exists.insert(key.clone());
            visiting.remove(&key);
            return Ok(key);
        }
        EntryState::Announced => {
            visiting.remove(&key);
            return Err(CoreError::CompetingInFlight { collection: key.0.clone(), key: key.1.clone() });
        }
        EntryState::Missing => {}
    }

    let collection = collections.get(&key.0).ok_or_else(|| CoreError::UnknownCollection(key.0.clone()))?;

    let dep_refs: Vec<Reference> = collection.dep_fn().map(|dep_fn| dep_fn(&reference.config)).unwrap_or_default();
    let mut deps = Vec::with_capacity(dep_refs.len());
    for dep_ref in &dep_refs {
        deps.push(expand_into(store, collections, dep_ref, dag, exists, visiting)?);
    }

    if collection.is_fixed() {
        visiting.remove(&key);
        return Err(CoreError::FixedCollectionMiss { collection: key.0.clone(), key: key.1.clone() });
    }

    dag.tasks.insert(key.clone(), Task { reference: reference.clone(), key: key.clone(), deps });
    dag.order.push(key.clone());
    visiting.remove(&key);
    Ok(key)
}

/// Announces every task in `dag` to the Store in one transaction, recording
/// a `source -> target` edge for every dependency pointer.
///
/// Returns `Ok(false)` (matching `Store::announce_entries`) if a competing
/// writer landed first and the batch was rolled back; the caller should
/// re-expand against the now-current Store state and retry.
pub fn announce<S: Store>(store: &S, executor_id: i64, dag: &TaskDag) -> Result<bool, StoreError> {
    let missing = dag.missing();
    if missing.is_empty() {
        return Ok(true);
    }

    let refs: Vec<NewAnnouncement> = missing.iter()
        .map(|t| NewAnnouncement {
            collection: t.key.0.clone(),
            key: t.key.1.clone(),
            config_bytes: canonical_json(&t.reference.config).into_bytes(),
        })
        .collect();

    let deps: Vec<DepEdge> = missing.iter()
        .flat_map(|t| t.deps.iter().map(move |d| DepEdge { source: t.key.clone(), target: d.clone() }))
        .collect();

    store.announce_entries(executor_id, &refs, &deps)
}

/// Inverse of `announce`: rolls back this batch's claims after a
/// `TaskRunner` failure, so the entries can be re-announced by whichever
/// executor picks up the work next.
pub fn unannounce<S: Store>(store: &S, executor_id: i64, dag: &TaskDag) -> Result<(), StoreError> {
    let refs: Vec<TaskKey> = dag.missing().into_iter().map(|t| t.key.clone()).collect();
    if refs.is_empty() {
        return Ok(());
    }
    store.unannounce_entries(executor_id, &refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecutorRecord;
    use crate::store::{CollectionSummary, EntrySummary, ExecutorSummary, RunStats, StoredEntry};
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::collections::HashMap as Map;

    /// An in-memory `Store` stand-in for exercising the Planner's expansion
    /// logic without a real backend.
    #[derive(Default)]
    struct FakeStore {
        finished: RefCell<Map<TaskKey, Value>>,
    }

    impl Store for FakeStore {
        fn ensure_collection(&self, _name: &str) -> Result<(), StoreError> {
            Ok(())
        }
        fn announce_entries(&self, _executor_id: i64, _refs: &[NewAnnouncement], _deps: &[DepEdge]) -> Result<bool, StoreError> {
            Ok(true)
        }
        fn set_entry_value(&self, _executor_id: i64, _collection: &str, _key: &str, _value_bytes: &[u8], _value_repr: Option<&str>) -> Result<bool, StoreError> {
            Ok(true)
        }
        fn get_entry_state(&self, collection: &str, key: &str) -> Result<EntryState, StoreError> {
            if self.finished.borrow().contains_key(&(collection.to_string(), key.to_string())) {
                Ok(EntryState::Finished)
            } else {
                Ok(EntryState::Missing)
            }
        }
        fn get_entry(&self, _collection: &str, _key: &str) -> Result<Option<StoredEntry>, StoreError> {
            Ok(None)
        }
        fn remove_entry_by_key(&self, _collection: &str, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }
        fn register_executor(&self, _record: &ExecutorRecord) -> Result<i64, StoreError> {
            Ok(1)
        }
        fn update_heartbeat(&self, _id: i64) -> Result<(), StoreError> {
            Ok(())
        }
        fn update_stats(&self, _id: i64, _stats: &Value) -> Result<(), StoreError> {
            Ok(())
        }
        fn stop_executor(&self, _id: i64) -> Result<(), StoreError> {
            Ok(())
        }
        fn unannounce_entries(&self, _executor_id: i64, _refs: &[TaskKey]) -> Result<(), StoreError> {
            Ok(())
        }
        fn collection_summaries(&self) -> Result<Vec<CollectionSummary>, StoreError> {
            Ok(vec![])
        }
        fn entry_summaries(&self, _collection: &str) -> Result<Vec<EntrySummary>, StoreError> {
            Ok(vec![])
        }
        fn executor_summaries(&self) -> Result<Vec<ExecutorSummary>, StoreError> {
            Ok(vec![])
        }
        fn get_run_stats(&self, _collection: &str) -> Result<RunStats, StoreError> {
            Ok(RunStats::default())
        }
    }

    /// `source` is fixed, so every key a test expands through `derived`
    /// must already be finished in the `FakeStore` — exactly as a fixed
    /// collection's contract requires.
    fn collections_with_deps() -> Map<String, Collection> {
        let mut map = Map::new();
        map.insert("source".to_string(), Collection::fixed("source"));
        map.insert(
            "derived".to_string(),
            Collection::computed(
                "derived",
                Box::new(|_config: &Value, _deps: &[Value]| Ok(Value::Null)),
                Some(Box::new(|config: &Value| vec![Reference::new("source", config["of"].clone())])),
            ),
        );
        map
    }

    fn finish(store: &FakeStore, collection: &str, config: Value) {
        let key = (collection.to_string(), Reference::new(collection, config).key());
        store.finished.borrow_mut().insert(key, Value::Bool(true));
    }

    #[test]
    fn expand_orders_dependencies_before_dependents() {
        let store = FakeStore::default();
        finish(&store, "source", json!(7));
        let collections = collections_with_deps();
        let root = Reference::new("derived", json!({"of": 7}));
        let dag = expand(&store, &collections, &[root.clone()]).unwrap();

        let root_key = (root.collection.clone(), root.key());
        let root_pos = dag.order.iter().position(|k| *k == root_key).unwrap();
        let dep_key = dag.get(&root_key).unwrap().deps[0].clone();
        // the dependency is already finished, so it never gets a task node
        // of its own — only the dependent ("derived") is in the build order.
        assert!(!dag.needs_build(&dep_key));
        assert_eq!(dag.order.len(), 1);
        assert_eq!(root_pos, 0);
    }

    #[test]
    fn expand_stops_at_a_finished_entry_without_walking_its_dependencies() {
        let store = FakeStore::default();
        // "derived"/7 is itself already finished; its dependency ("source"/7)
        // is deliberately left unfinished in a fixed collection, which would
        // fail expansion if it were ever visited.
        finish(&store, "derived", json!({"of": 7}));
        let collections = collections_with_deps();
        let root = Reference::new("derived", json!({"of": 7}));
        let dag = expand(&store, &collections, std::slice::from_ref(&root)).unwrap();
        assert!(dag.tasks.is_empty());
    }

    #[test]
    fn expand_fails_fatally_on_a_fixed_collection_miss_in_a_dependency() {
        let store = FakeStore::default();
        // "source"/7 is left unfinished: a fixed collection with no build
        // function can never satisfy it.
        let collections = collections_with_deps();
        let root = Reference::new("derived", json!({"of": 7}));
        let err = expand(&store, &collections, std::slice::from_ref(&root)).unwrap_err();
        assert!(matches!(err, CoreError::FixedCollectionMiss { ref collection, .. } if collection == "source"));
    }

    #[test]
    fn expand_deduplicates_shared_dependencies() {
        let store = FakeStore::default();
        finish(&store, "source", json!(1));
        let mut collections = collections_with_deps();
        collections.insert(
            "fan_in".to_string(),
            Collection::computed(
                "fan_in",
                Box::new(|_config: &Value, _deps: &[Value]| Ok(Value::Null)),
                Some(Box::new(|_config: &Value| {
                    vec![Reference::new("derived", json!({"of": 1})), Reference::new("derived", json!({"of": 1}))]
                })),
            ),
        );
        let root = Reference::new("fan_in", json!({}));
        let dag = expand(&store, &collections, std::slice::from_ref(&root)).unwrap();
        // two identical dependency references collapse to a single node;
        // "source"/1 is already finished and contributes no node at all.
        assert_eq!(dag.order.len(), 2);
    }

    #[test]
    fn missing_excludes_already_finished_entries() {
        let store = FakeStore::default();
        finish(&store, "source", json!(1));

        let collections = collections_with_deps();
        let root = Reference::new("derived", json!({"of": 1}));
        let dag = expand(&store, &collections, std::slice::from_ref(&root)).unwrap();

        let missing_keys: Vec<&TaskKey> = dag.missing().into_iter().map(|t| &t.key).collect();
        assert_eq!(missing_keys.len(), 1);
        assert_eq!(missing_keys[0].0, "derived");
    }

    #[test]
    fn expand_shares_one_dag_across_multiple_requested_refs() {
        let store = FakeStore::default();
        finish(&store, "source", json!(1));
        finish(&store, "source", json!(2));
        let collections = collections_with_deps();
        let refs = vec![Reference::new("derived", json!({"of": 1})), Reference::new("derived", json!({"of": 2}))];
        let dag = expand(&store, &collections, &refs).unwrap();
        assert_eq!(dag.order.len(), 2);
    }
}
