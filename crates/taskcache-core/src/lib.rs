//! taskcache-core: scheduling and persistence contracts for a content-addressed
//! computation cache.
//!
//! Purpose:
//! - Define the neutral, backend-agnostic contracts (`Store`, `TaskRunner`) and
//!   the orchestration that sits on top of them: the dependency-expansion
//!   planner, the executor registry/heartbeat, and the `Runtime` façade that
//!   drives a `compute_refs` request end to end.
//! - Stay free of any concrete database dependency; a `Store` implementation
//!   (e.g. `taskcache-store`, backed by SQLite) is plugged in generically.
//!
//! Module map:
//! - `key`: canonical-JSON + digest key function.
//! - `model`: `Collection`, `Reference`, `Entry`, executor records.
//! - `store`: the `Store` trait and the types its methods speak in.
//! - `registry`: in-process executor bookkeeping and heartbeat timers.
//! - `planner`: reference -> task DAG expansion and announcement.
//! - `task_runner`: the contract the Runtime hands a task DAG to.
//! - `runtime`: the façade tying all of the above together.
//! - `errors`: the error types surfaced to callers.

pub mod constants;
pub mod errors;
pub mod key;
pub mod model;
pub mod planner;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod task_runner;

pub use errors::CoreError;
pub use model::{BuildFn, Collection, DepFn, Entry, EntryState, ExecutorRecord, Reference};
pub use planner::{Task, TaskDag, TaskKey};
pub use registry::{ExecutorHandle, ExecutorRegistry};
pub use runtime::Runtime;
pub use store::{CollectionSummary, DepEdge, EntrySummary, ExecutorStatus, ExecutorSummary, NewAnnouncement, RunStats, Store, StoreError, StoredEntry};
pub use task_runner::{SequentialTaskRunner, TaskRunner};
