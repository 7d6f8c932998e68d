//! The contract the `Runtime` hands an expanded, announced `TaskDag` to for
//! actual execution, plus a straightforward sequential implementation.
//!
//! Splitting this out from `Runtime` is what lets a caller swap in a
//! thread-pool or async runner later without touching the planner or the
//! announce/unannounce protocol.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::errors::CoreError;
use crate::model::Collection;
use crate::planner::{TaskDag, TaskKey};
use crate::store::Store;

/// Builds every task this executor just announced, in dependency order, and
/// writes each result back through `Store::set_entry_value`.
///
/// Implementations must not return `Ok(())` until every task this executor
/// owns in `dag` either has a value or the run has failed outright; a
/// partial success with some tasks left unbuilt is a bug; the `Runtime`
/// relies on `unannounce` to clean up after a genuine failure, not on the
/// runner reporting partial progress.
pub trait TaskRunner: Send + Sync {
    fn run(&self, store: &dyn Store, executor_id: i64, dag: &TaskDag, collections: &HashMap<String, Collection>) -> Result<(), CoreError>;
}

/// Builds tasks one at a time, in the DAG's topological order. Dependency
/// values already built in this run are served from an in-memory cache;
/// anything else is re-read from the Store.
#[derive(Debug, Default)]
pub struct SequentialTaskRunner;

impl TaskRunner for SequentialTaskRunner {
    fn run(&self, store: &dyn Store, executor_id: i64, dag: &TaskDag, collections: &HashMap<String, Collection>) -> Result<(), CoreError> {
        let mut cache: HashMap<TaskKey, Value> = HashMap::new();
        let owned: HashSet<TaskKey> = dag.missing().into_iter().map(|t| t.key.clone()).collect();

        for key in &dag.order {
            if !owned.contains(key) {
                continue;
            }
            let task = dag.get(key).expect("dag.order and dag.tasks are kept in sync by expand()");

            let collection = collections.get(&task.reference.collection).ok_or_else(|| CoreError::UnknownCollection(task.reference.collection.clone()))?;
            let build_fn = collection.build_fn().ok_or_else(|| CoreError::FixedCollectionMiss {
                collection: task.reference.collection.clone(),
                key: task.key.1.clone(),
            })?;

            let mut dep_values = Vec::with_capacity(task.deps.len());
            for dep_key in &task.deps {
                let value = match cache.get(dep_key) {
                    Some(v) => v.clone(),
                    None => {
                        let stored = store
                            .get_entry(&dep_key.0, &dep_key.1)?
                            .ok_or_else(|| CoreError::Internal(format!("dependency {}/{} vanished mid-build", dep_key.0, dep_key.1)))?;
                        let bytes = stored.value_bytes.ok_or_else(|| CoreError::Internal(format!("dependency {}/{} is not finished", dep_key.0, dep_key.1)))?;
                        serde_json::from_slice(&bytes).map_err(|e| CoreError::Internal(e.to_string()))?
                    }
                };
                dep_values.push(value);
            }

            let value = build_fn(&task.reference.config, &dep_values).map_err(CoreError::BuildFailed)?;
            let value_bytes = serde_json::to_vec(&value).map_err(|e| CoreError::Internal(e.to_string()))?;
            let value_repr = value.to_string();

            let wrote = store.set_entry_value(executor_id, &task.reference.collection, &task.key.1, &value_bytes, Some(&value_repr))?;
            if !wrote {
                return Err(CoreError::CompetingInFlight { collection: task.reference.collection.clone(), key: task.key.1.clone() });
            }

            cache.insert(key.clone(), value);
        }
        Ok(())
    }
}
