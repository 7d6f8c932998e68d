//! Embedded migration runner.
//!
//! Migrations live under `migrations/` in this crate and are baked into the
//! binary at compile time, so a deployed executor never needs the `diesel`
//! CLI or a migrations directory on disk.

use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn run_pending_migrations(conn: &mut SqliteConnection) -> Result<(), String> {
    conn.run_pending_migrations(MIGRATIONS).map(|_| ()).map_err(|e| format!("migration error: {e}"))
}
