//! r2d2-pooled SQLite connections, with foreign keys enabled on every
//! checkout and pending migrations applied once at pool construction.

use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sqlite::SqliteConnection;
use log::debug;
use taskcache_core::store::StoreError;

use crate::config::DbConfig;
use crate::error::map_pool_error;
use crate::migrations::run_pending_migrations;

pub type SqlitePool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type PooledSqliteConnection = r2d2::PooledConnection<ConnectionManager<SqliteConnection>>;

/// SQLite has no server-side connection defaults: each new connection starts
/// with foreign key enforcement off. Without this, `ON DELETE CASCADE` in the
/// schema is silently a no-op and dependency-closure deletes would leak rows.
#[derive(Debug)]
struct ForeignKeysOn;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ForeignKeysOn {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON;").map_err(r2d2::Error::QueryError)
    }
}

/// Builds an r2d2 pool over `cfg.url`, runs pending migrations once against a
/// fresh connection, and wires every pooled connection to enforce foreign
/// keys on acquire.
pub fn build_pool(cfg: &DbConfig) -> Result<SqlitePool, StoreError> {
    let manager = ConnectionManager::<SqliteConnection>::new(&cfg.url);
    let min = cfg.min_connections.max(1);
    let max = cfg.max_connections.max(min);

    let pool = r2d2::Pool::builder()
        .min_idle(Some(min))
        .max_size(max)
        .connection_customizer(Box::new(ForeignKeysOn))
        .build(manager)
        .map_err(|e| StoreError::Unknown(format!("pool build: {e}")))?;

    let mut conn = pool.get().map_err(map_pool_error)?;
    run_pending_migrations(&mut conn).map_err(StoreError::Unknown)?;
    debug!("taskcache-store: pool ready at {}", cfg.url);
    Ok(pool)
}

/// Development convenience: load `.env`, read `DbConfig::from_env`, build a
/// migrated pool.
pub fn build_pool_from_env() -> Result<SqlitePool, StoreError> {
    crate::config::init_dotenv();
    build_pool(&DbConfig::from_env())
}
