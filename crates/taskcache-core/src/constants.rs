//! Engine-wide constants.
//!
//! Grouped here, teacher-style, because they participate in on-disk
//! compatibility decisions even though none of them currently enter any hash.

/// Logical version of the scheduling engine. Bumping it is a signal to
/// operators that the persisted schema or the announcement protocol changed,
/// not something that participates in the key function.
pub const ENGINE_VERSION: &str = "1.0";

/// Lower bound, in seconds, of the randomized backoff applied on a write-lock
/// conflict (`SQLITE_BUSY`).
pub const LOCK_BACKOFF_MIN_SECS: f64 = 0.5;

/// Upper bound, in seconds, of the randomized backoff applied on a write-lock
/// conflict.
pub const LOCK_BACKOFF_MAX_SECS: f64 = 3.0;

/// Grace factor applied to an executor's own `heartbeat_interval` to decide
/// liveness: dead iff `now - heartbeat > FACTOR * heartbeat_interval`.
pub const HEARTBEAT_DEAD_FACTOR: f64 = 2.0;
