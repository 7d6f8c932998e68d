//! Environment-driven connection configuration, one-time `.env` load.

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // fine if no .env file is present
});

/// Force the `.env` load from an external caller without needing a `DbConfig`.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file (or `:memory:`).
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    /// Default heartbeat interval, in seconds, for executors that don't
    /// specify their own. Purely a convenience default for callers; the
    /// Store itself treats `heartbeat_interval` as per-executor data.
    pub default_heartbeat_interval_secs: f64,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "taskcache.sqlite3".to_string());
        let min_connections = env::var("DATABASE_MIN_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(1);
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(8);
        let default_heartbeat_interval_secs =
            env::var("HEARTBEAT_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30.0);
        Self { url, min_connections, max_connections, default_heartbeat_interval_secs }
    }
}
