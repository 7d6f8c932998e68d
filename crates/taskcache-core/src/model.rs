//! Neutral data model: collections, references, entries, executor records.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::key::compute_key;

/// `config -> value`, given the config and the resolved values of the
/// dependency references returned by the collection's `DepFn`, in order.
pub type BuildFn = Box<dyn Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync>;

/// `config -> ordered list of references this config depends on`.
pub type DepFn = Box<dyn Fn(&Value) -> Vec<Reference> + Send + Sync>;

/// A named family of computations sharing a build/dependency contract.
///
/// A collection with neither function is "fixed": its entries can only be
/// inserted directly (e.g. `S1` in the testable-properties scenarios), never
/// produced by computation.
pub struct Collection {
    pub name: String,
    build_fn: Option<BuildFn>,
    dep_fn: Option<DepFn>,
}

impl Collection {
    /// A collection with no build/dependency function: entries must be
    /// inserted directly.
    pub fn fixed(name: impl Into<String>) -> Self {
        Self { name: name.into(), build_fn: None, dep_fn: None }
    }

    /// A collection computed on demand, optionally with dependencies.
    pub fn computed(name: impl Into<String>, build_fn: BuildFn, dep_fn: Option<DepFn>) -> Self {
        Self { name: name.into(), build_fn: Some(build_fn), dep_fn }
    }

    pub fn is_fixed(&self) -> bool {
        self.build_fn.is_none()
    }

    pub fn build_fn(&self) -> Option<&BuildFn> {
        self.build_fn.as_ref()
    }

    pub fn dep_fn(&self) -> Option<&DepFn> {
        self.dep_fn.as_ref()
    }
}

// `build_fn`/`dep_fn` are trait objects and not `Debug`; expose a compact view.
impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
         .field("name", &self.name)
         .field("fixed", &self.is_fixed())
         .field("has_deps", &self.dep_fn.is_some())
         .finish()
    }
}

/// An (unresolved) pointer to an entry by collection name + config value.
#[derive(Debug, Clone)]
pub struct Reference {
    pub collection: String,
    pub config: Value,
}

impl Reference {
    pub fn new(collection: impl Into<String>, config: Value) -> Self {
        Self { collection: collection.into(), config }
    }

    /// The stable digest key of this reference's config.
    pub fn key(&self) -> String {
        compute_key(&self.config)
    }
}

/// Durable state of an (collection, key) entry, as observed by the Planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Finished,
    Announced,
    Missing,
}

/// A materialized entry, decoded back from the opaque bytes the `Store`
/// persists.
#[derive(Debug, Clone)]
pub struct Entry {
    pub config: Value,
    pub value: Option<Value>,
    pub value_repr: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn is_finished(&self) -> bool {
        self.value.is_some()
    }
}

/// An executor record as tracked by the registry and persisted by the Store.
#[derive(Debug, Clone)]
pub struct ExecutorRecord {
    pub id: Option<i64>,
    pub created: DateTime<Utc>,
    pub heartbeat: DateTime<Utc>,
    pub heartbeat_interval: f64,
    pub stats: Option<Value>,
    pub executor_type: String,
    pub version: String,
    pub resources: Value,
}

impl ExecutorRecord {
    pub fn new(executor_type: impl Into<String>, version: impl Into<String>, heartbeat_interval: f64, resources: Value) -> Self {
        let now = Utc::now();
        Self { id: None,
               created: now,
               heartbeat: now,
               heartbeat_interval,
               stats: Some(Value::Object(Default::default())),
               executor_type: executor_type.into(),
               version: version.into(),
               resources }
    }

    /// True iff `now - heartbeat <= dead_factor * heartbeat_interval` and the
    /// executor has not been cleanly stopped (`stats` non-null).
    pub fn is_live_at(&self, now: DateTime<Utc>, dead_factor: f64) -> bool {
        if self.stats.is_none() {
            return false;
        }
        let age = (now - self.heartbeat).num_milliseconds() as f64 / 1000.0;
        age <= dead_factor * self.heartbeat_interval
    }
}
