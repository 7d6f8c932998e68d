//! taskcache-store: the SQLite-backed `Store` implementation for
//! taskcache-core, built on Diesel + r2d2.
//!
//! Module map:
//! - `config`: environment-driven `DbConfig` (`DATABASE_URL`, pool sizes).
//! - `pool`: r2d2 pool construction, foreign-key enforcement, migrations.
//! - `migrations`: embedded Diesel migrations.
//! - `schema`: hand-written Diesel table definitions.
//! - `error`: Diesel/r2d2 error mapping onto `taskcache_core::store::StoreError`.
//! - `store`: `SqliteStore`, the `Store` trait implementation itself.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod schema;
pub mod store;

pub use config::DbConfig;
pub use pool::{build_pool, build_pool_from_env, SqlitePool};
pub use store::SqliteStore;
