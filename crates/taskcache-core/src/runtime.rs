//! `Runtime`: the façade that ties collections, the executor registry, the
//! Planner and a `TaskRunner` together behind a single `compute_refs` call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{debug, info};
use serde_json::Value;

use crate::errors::CoreError;
use crate::key::canonical_json;
use crate::model::{Collection, Entry, EntryState, Reference};
use crate::planner;
use crate::registry::{ExecutorHandle, ExecutorRegistry};
use crate::store::{NewAnnouncement, Store};
use crate::task_runner::{SequentialTaskRunner, TaskRunner};

/// Retries the expand/announce race this many times before giving up and
/// surfacing `CoreError::LostAnnouncement` to the caller.
const MAX_ANNOUNCE_ATTEMPTS: u32 = 5;

/// Drives a single `compute_refs` request end to end: expand the shared
/// dependency DAG for every requested reference, announce whatever is
/// missing in one batch, hand it to a `TaskRunner`, and return the
/// requested refs' finished values in request order.
pub struct Runtime<S: Store + 'static> {
    store: Arc<S>,
    collections: RwLock<HashMap<String, Collection>>,
    registry: ExecutorRegistry<S>,
    task_runner: Box<dyn TaskRunner>,
}

impl<S: Store + 'static> Runtime<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_task_runner(store, Box::new(SequentialTaskRunner))
    }

    pub fn with_task_runner(store: Arc<S>, task_runner: Box<dyn TaskRunner>) -> Self {
        let registry = ExecutorRegistry::new(store.clone());
        Self { store, collections: RwLock::new(HashMap::new()), registry, task_runner }
    }

    /// Register a collection. Collections are immutable once registered;
    /// registering the same name twice is an error.
    pub fn register_collection(&self, collection: Collection) -> Result<(), CoreError> {
        let name = collection.name.clone();
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(&name) {
            return Err(CoreError::DuplicateCollection(name));
        }
        self.store.ensure_collection(&name)?;
        collections.insert(name, collection);
        Ok(())
    }

    /// Insert a value directly into a fixed collection's entry. Fixed
    /// collections (no build function) can only be populated this way — the
    /// Planner refuses to build them. Idempotent: inserting into an
    /// already-finished key is a silent no-op rather than an error, and a
    /// competing writer that finished the key first is not treated as a
    /// failure either.
    pub fn insert(&self, reference: &Reference, value: Value) -> Result<(), CoreError> {
        let collections = self.collections.read().unwrap();
        let collection = collections
            .get(&reference.collection)
            .ok_or_else(|| CoreError::UnknownCollection(reference.collection.clone()))?;
        if !collection.is_fixed() {
            return Err(CoreError::Internal(format!(
                "collection '{}' has a build function; entries are computed, not inserted directly",
                reference.collection
            )));
        }

        let key = reference.key();
        if self.store.get_entry_state(&reference.collection, &key)? == EntryState::Finished {
            return Ok(());
        }

        let executor = self.registry.first_live().ok_or(CoreError::NoExecutors)?;
        let announcement = NewAnnouncement {
            collection: reference.collection.clone(),
            key: key.clone(),
            config_bytes: canonical_json(&reference.config).into_bytes(),
        };
        if !self.store.announce_entries(executor.id(), &[announcement], &[])? {
            // Someone else announced or finished this key first; either way
            // the value now exists or will shortly, so there is nothing left
            // for this call to do.
            return Ok(());
        }

        let value_bytes = serde_json::to_vec(&value).map_err(|e| CoreError::Internal(e.to_string()))?;
        let value_repr = value.to_string();
        if !self.store.set_entry_value(executor.id(), &reference.collection, &key, &value_bytes, Some(&value_repr))? {
            return Err(CoreError::Internal(format!("lost race inserting {}/{}", reference.collection, key)));
        }
        Ok(())
    }

    /// Register a new executor and start its heartbeat thread.
    pub fn register_executor(&self, executor_type: impl Into<String>, version: impl Into<String>, heartbeat_interval: f64, resources: Value) -> Result<Arc<ExecutorHandle>, CoreError> {
        self.registry.register(executor_type, version, heartbeat_interval, resources).map_err(Into::into)
    }

    /// Cleanly stop an executor, reclaiming any entries it left announced
    /// but never finished.
    pub fn unregister_executor(&self, handle: &Arc<ExecutorHandle>) -> Result<(), CoreError> {
        self.registry.unregister(handle).map_err(Into::into)
    }

    /// Resolve every reference in `refs` to its finished value, as one
    /// batch: expansion, classification and announcement all happen across
    /// the whole set in a single shared `TaskDag`, so two references
    /// requested together land in the same `announce_entries` transaction
    /// (distilled spec §4.4: "Input: a set of target references").
    /// Building (and any unfinished dependencies) happens as needed; the
    /// returned `Vec` is in the same order as `refs`.
    pub fn compute_refs(&self, refs: &[Reference]) -> Result<Vec<Value>, CoreError> {
        let collections = self.collections.read().unwrap();

        for attempt in 0..MAX_ANNOUNCE_ATTEMPTS {
            let dag = planner::expand(self.store.as_ref(), &collections, refs)?;

            if !dag.missing().is_empty() {
                let executor = self.registry.first_live().ok_or(CoreError::NoExecutors)?;
                debug!("compute attempt {attempt}: {} missing tasks for {} requested ref(s)", dag.missing().len(), refs.len());

                if !planner::announce(self.store.as_ref(), executor.id(), &dag)? {
                    // Lost the race to a competing writer; re-expand and retry.
                    continue;
                }

                if let Err(err) = self.task_runner.run(self.store.as_ref(), executor.id(), &dag, &collections) {
                    planner::unannounce(self.store.as_ref(), executor.id(), &dag)?;
                    return Err(err);
                }
            }

            let values = refs
                .iter()
                .map(|reference| self.fetch_value(&(reference.collection.clone(), reference.key())))
                .collect::<Result<Vec<_>, _>>()?;
            info!("finished computing {} requested ref(s)", refs.len());
            return Ok(values);
        }

        Err(CoreError::LostAnnouncement)
    }

    /// Resolve a single `reference` to its finished value. A thin
    /// convenience wrapper over `compute_refs` for the common one-reference
    /// case.
    pub fn compute(&self, reference: &Reference) -> Result<Value, CoreError> {
        self.compute_refs(std::slice::from_ref(reference)).map(|mut values| values.remove(0))
    }

    /// Read back a finished entry's value by key. Returns `Internal` if the
    /// entry is gone or was never finished, which would indicate a bug in
    /// the announce/build protocol rather than a normal runtime condition.
    fn fetch_value(&self, key: &(String, String)) -> Result<Value, CoreError> {
        let stored = self.store.get_entry(&key.0, &key.1)?.ok_or_else(|| CoreError::Internal(format!("entry {}/{} vanished after compute", key.0, key.1)))?;
        let bytes = stored.value_bytes.ok_or_else(|| CoreError::Internal(format!("entry {}/{} has no value after compute", key.0, key.1)))?;
        serde_json::from_slice(&bytes).map_err(|e| CoreError::Internal(e.to_string()))
    }

    /// Fetch a materialized `Entry` (config + value + metadata) rather than
    /// just its value, for callers that want the full record.
    pub fn get_entry(&self, reference: &Reference) -> Result<Option<Entry>, CoreError> {
        let key = reference.key();
        let stored = match self.store.get_entry(&reference.collection, &key)? {
            Some(s) => s,
            None => return Ok(None),
        };
        let config: Value = serde_json::from_slice(&stored.config_bytes).map_err(|e| CoreError::Internal(e.to_string()))?;
        let value = stored.value_bytes.as_deref().map(serde_json::from_slice).transpose().map_err(|e: serde_json::Error| CoreError::Internal(e.to_string()))?;
        Ok(Some(Entry { config, value, value_repr: stored.value_repr, created: stored.created }))
    }

    /// Remove an entry and every entry that transitively depends on it.
    pub fn remove_entry(&self, reference: &Reference) -> Result<(), CoreError> {
        self.store.remove_entry_by_key(&reference.collection, &reference.key()).map_err(Into::into)
    }

    /// Overwrite an executor's reported stats blob (arbitrary JSON, purely
    /// informational — not consulted by the Planner or liveness checks).
    pub fn report_executor_stats(&self, handle: &Arc<ExecutorHandle>, stats: &Value) -> Result<(), CoreError> {
        self.store.update_stats(handle.id(), stats).map_err(Into::into)
    }

    /// Cleanly stop every executor this `Runtime` registered, in
    /// registration order. Intended for an orderly process shutdown; a
    /// crashed process instead relies on heartbeat expiry.
    pub fn stop(&self) -> Result<(), CoreError> {
        self.registry.stop_all().map_err(Into::into)
    }

    pub fn store(&self) -> &S {
        self.store.as_ref()
    }
}
