//! Errors surfaced by the scheduling/runtime layer.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("collection '{0}' already registered")]
    DuplicateCollection(String),

    #[error("collection '{collection}' is fixed and has no entry for key '{key}'")]
    FixedCollectionMiss { collection: String, key: String },

    #[error("entry '{collection}'/'{key}' is announced by another executor; cross-executor rendezvous is not supported")]
    CompetingInFlight { collection: String, key: String },

    #[error("announcement was lost to a competing writer; retry from scratch")]
    LostAnnouncement,

    #[error("no executors registered")]
    NoExecutors,

    #[error("build function failed: {0}")]
    BuildFailed(String),

    #[error("task runner failed: {0}")]
    RunnerFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal: {0}")]
    Internal(String),
}
