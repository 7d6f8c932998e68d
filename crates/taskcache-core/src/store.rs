//! The `Store` contract: durable, transactional persistence over the
//! collections/entries/deps/executors schema. No policy lives here — only
//! idempotent primitives with strict invariants. `config`/`value` are opaque
//! byte strings at this boundary; the Planner/Runtime own the JSON<->bytes
//! conversion via the key function's canonicalizer.

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::model::{EntryState, ExecutorRecord};

/// A directed `(source) -> (target)` dependency edge between two entries,
/// identified by `(collection, key)` pairs.
#[derive(Debug, Clone)]
pub struct DepEdge {
    pub source: (String, String),
    pub target: (String, String),
}

/// An entry about to be announced: its identity plus the canonical-JSON
/// bytes of its config (opaque to the Store).
#[derive(Debug, Clone)]
pub struct NewAnnouncement {
    pub collection: String,
    pub key: String,
    pub config_bytes: Vec<u8>,
}

/// The raw row behind an (collection, key), as read back from the Store.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub config_bytes: Vec<u8>,
    pub value_bytes: Option<Vec<u8>>,
    pub value_repr: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorStatus {
    Running,
    Stopped,
    Lost,
}

#[derive(Debug, Clone)]
pub struct CollectionSummary {
    pub name: String,
    pub count: i64,
    pub size: i64,
}

#[derive(Debug, Clone)]
pub struct EntrySummary {
    pub key: String,
    pub size: i64,
    pub value_repr: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ExecutorSummary {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub status: ExecutorStatus,
    pub stats: Option<Value>,
    pub executor_type: String,
    pub version: String,
    pub resources: Value,
}

/// Aesthetic run-duration stats for the reporter; may legitimately be all
/// `None` (no finished runs yet, or the backend does not track durations).
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub avg_secs: Option<f64>,
    pub stdev_secs: Option<f64>,
}

/// Errors a `Store` implementation can surface. Transport-agnostic so that
/// `taskcache-core` stays free of any concrete database dependency while
/// still giving the Planner/Runtime enough information to decide whether an
/// error is retryable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("not found")]
    NotFound,

    #[error("write-lock contention exceeded local retry budget")]
    WriteLockTimeout,

    #[error("unknown store error: {0}")]
    Unknown(String),
}

/// Durable, transactional persistence over the collections/entries/deps/
/// executors schema.
///
/// Every method executes inside a single write transaction with immediate
/// write-lock acquisition; implementations are expected to retry lock
/// contention internally with randomized backoff and surface genuine
/// integrity violations (not lock contention) to the caller unretried.
pub trait Store: Send + Sync {
    /// Insert-if-absent. Idempotent.
    fn ensure_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Dead-entry cleanup, then insert `refs` and `deps` atomically. Returns
    /// `Ok(false)` (not an error) if a competing announcement landed first
    /// and the whole batch was rolled back; the caller must restart.
    fn announce_entries(&self, executor_id: i64, refs: &[NewAnnouncement], deps: &[DepEdge]) -> Result<bool, StoreError>;

    /// Update iff `value is null AND executor = executor_id`. Returns
    /// `Ok(false)` (not an error) if the row count affected was not exactly
    /// one — a stale executor or a concurrent winner.
    fn set_entry_value(&self, executor_id: i64, collection: &str, key: &str, value_bytes: &[u8], value_repr: Option<&str>) -> Result<bool, StoreError>;

    fn get_entry_state(&self, collection: &str, key: &str) -> Result<EntryState, StoreError>;

    fn get_entry(&self, collection: &str, key: &str) -> Result<Option<StoredEntry>, StoreError>;

    /// Delete the entry and every entry that transitively depends on it.
    fn remove_entry_by_key(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    /// Insert a new executor row and return its assigned id.
    fn register_executor(&self, record: &ExecutorRecord) -> Result<i64, StoreError>;

    fn update_heartbeat(&self, id: i64) -> Result<(), StoreError>;

    fn update_stats(&self, id: i64, stats: &Value) -> Result<(), StoreError>;

    /// Set `stats = null` (clean stop) and delete all of that executor's
    /// entries whose `value` is still null (announcement abandonment).
    fn stop_executor(&self, id: i64) -> Result<(), StoreError>;

    /// Inverse of `announce_entries`, without any integrity check: deletes
    /// the still-unfinished rows this batch created after a task-runner
    /// failure.
    fn unannounce_entries(&self, executor_id: i64, refs: &[(String, String)]) -> Result<(), StoreError>;

    fn collection_summaries(&self) -> Result<Vec<CollectionSummary>, StoreError>;

    fn entry_summaries(&self, collection: &str) -> Result<Vec<EntrySummary>, StoreError>;

    fn executor_summaries(&self) -> Result<Vec<ExecutorSummary>, StoreError>;

    fn get_run_stats(&self, collection: &str) -> Result<RunStats, StoreError>;
}
