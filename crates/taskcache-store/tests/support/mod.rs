//! Shared test scaffolding: each scenario gets its own throwaway SQLite file.
//! A file-backed SQLite engine needs nothing external to run, so there is no
//! `DATABASE_URL` skip-gate here.

use std::sync::Arc;

use taskcache_store::{config::DbConfig, SqliteStore};

pub struct TempStore {
    // Keeps the directory (and its database file) alive for the test's
    // duration; dropped (and deleted) at the end of the test.
    _dir: tempfile::TempDir,
    pub store: Arc<SqliteStore>,
}

pub fn temp_store() -> TempStore {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("taskcache-test.sqlite3");
    let cfg = DbConfig { url: path.to_string_lossy().into_owned(), min_connections: 1, max_connections: 4, default_heartbeat_interval_secs: 30.0 };
    let pool = taskcache_store::build_pool(&cfg).expect("build pool");
    TempStore { _dir: dir, store: Arc::new(SqliteStore::new(pool)) }
}
