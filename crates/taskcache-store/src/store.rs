//! `SqliteStore`: the Diesel+SQLite backend for `taskcache_core::store::Store`.
//!
//! Every write goes through `immediate_transaction` (`BEGIN IMMEDIATE`), so
//! the write lock is acquired up front rather than upgraded mid-transaction;
//! contention (`SQLITE_BUSY`) is retried here with randomized backoff, never
//! surfaced to the Planner as anything but a genuine integrity error.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sql_types::{BigInt, Double, Nullable, Text};
use diesel::sqlite::SqliteConnection;
use log::{debug, warn};
use rand::Rng;
use serde_json::Value;

use taskcache_core::constants::{HEARTBEAT_DEAD_FACTOR, LOCK_BACKOFF_MAX_SECS, LOCK_BACKOFF_MIN_SECS};
use taskcache_core::model::{EntryState, ExecutorRecord};
use taskcache_core::store::{
    CollectionSummary, DepEdge, EntrySummary, ExecutorStatus, ExecutorSummary, NewAnnouncement, RunStats, Store,
    StoreError, StoredEntry,
};

use crate::error::{map_diesel_error, map_pool_error};
use crate::pool::SqlitePool;
use crate::schema::{collections, deps, entries, executors};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn backoff() {
        let secs = rand::thread_rng().gen_range(LOCK_BACKOFF_MIN_SECS..=LOCK_BACKOFF_MAX_SECS);
        thread::sleep(Duration::from_secs_f64(secs));
    }

    /// Runs `f` inside a `BEGIN IMMEDIATE` transaction, retrying indefinitely
    /// on write-lock contention and surfacing any other error unretried.
    fn with_write<T>(&self, f: impl Fn(&mut SqliteConnection) -> Result<T, DieselError>) -> Result<T, StoreError> {
        let mut conn = self.pool.get().map_err(map_pool_error)?;
        loop {
            match conn.immediate_transaction(|c| f(c)) {
                Ok(v) => return Ok(v),
                Err(e) => match map_diesel_error(e) {
                    StoreError::WriteLockTimeout => {
                        warn!("write-lock contention, backing off");
                        Self::backoff();
                    }
                    other => return Err(other),
                },
            }
        }
    }

    /// Read path: no transaction needed, but the same busy-retry discipline
    /// applies since a concurrent writer can still stall a reader briefly.
    fn with_read<T>(&self, f: impl Fn(&mut SqliteConnection) -> Result<T, DieselError>) -> Result<T, StoreError> {
        let mut conn = self.pool.get().map_err(map_pool_error)?;
        loop {
            match f(&mut conn) {
                Ok(v) => return Ok(v),
                Err(e) => match map_diesel_error(e) {
                    StoreError::WriteLockTimeout => Self::backoff(),
                    other => return Err(other),
                },
            }
        }
    }

    fn is_executor_live(conn: &mut SqliteConnection, executor_id: i64) -> Result<bool, DieselError> {
        let row: Option<(String, f64, Option<String>)> = executors::table
            .filter(executors::id.eq(executor_id))
            .select((executors::heartbeat, executors::heartbeat_interval, executors::stats))
            .first(conn)
            .optional()?;
        Ok(match row {
            None => false,
            Some((heartbeat, interval, stats)) => {
                if stats.is_none() {
                    false
                } else {
                    let heartbeat: DateTime<Utc> = heartbeat.parse().unwrap_or_else(|_| Utc::now());
                    let age = (Utc::now() - heartbeat).num_milliseconds() as f64 / 1000.0;
                    age <= HEARTBEAT_DEAD_FACTOR * interval
                }
            }
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = entries)]
struct NewEntryRow<'a> {
    collection: &'a str,
    key: &'a str,
    config: &'a [u8],
    executor: i64,
}

#[derive(Insertable)]
#[diesel(table_name = deps)]
struct NewDepRow<'a> {
    collection_s: &'a str,
    key_s: &'a str,
    collection_t: &'a str,
    key_t: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = executors)]
struct NewExecutorRow<'a> {
    created: String,
    heartbeat: String,
    heartbeat_interval: f64,
    stats: Option<String>,
    type_: &'a str,
    version: &'a str,
    resources: String,
}

impl Store for SqliteStore {
    fn ensure_collection(&self, name: &str) -> Result<(), StoreError> {
        self.with_write(|conn| {
            diesel::insert_into(collections::table)
                .values(collections::name.eq(name))
                .on_conflict(collections::name)
                .do_nothing()
                .execute(conn)
                .map(|_| ())
        })
    }

    fn announce_entries(&self, executor_id: i64, refs: &[NewAnnouncement], deps_edges: &[DepEdge]) -> Result<bool, StoreError> {
        let result = self.with_write(|conn| {
            // Dead-entry cleanup: unfinished rows owned by an executor that is
            // either stopped (`stats` null) or past its heartbeat grace period.
            diesel::sql_query(
                "DELETE FROM entries WHERE value IS NULL AND executor IN ( \
                    SELECT id FROM executors WHERE stats IS NULL \
                    OR (strftime('%s','now') - strftime('%s', heartbeat)) > heartbeat_interval * ?1)",
            )
            .bind::<Double, _>(HEARTBEAT_DEAD_FACTOR)
            .execute(conn)?;

            for r in refs {
                diesel::insert_into(entries::table)
                    .values(NewEntryRow { collection: &r.collection, key: &r.key, config: &r.config_bytes, executor: executor_id })
                    .execute(conn)?;
            }

            for d in deps_edges {
                diesel::insert_into(deps::table)
                    .values(NewDepRow {
                        collection_s: &d.source.0,
                        key_s: &d.source.1,
                        collection_t: &d.target.0,
                        key_t: &d.target.1,
                    })
                    .execute(conn)?;
            }

            Ok(())
        });

        match result {
            Ok(()) => Ok(true),
            Err(StoreError::UniqueViolation(_)) => {
                debug!("announce_entries: lost to a competing writer");
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    fn set_entry_value(&self, executor_id: i64, collection: &str, key: &str, value_bytes: &[u8], value_repr: Option<&str>) -> Result<bool, StoreError> {
        let created = Utc::now().to_rfc3339();
        self.with_write(|conn| {
            let affected = diesel::update(
                entries::table
                    .filter(entries::collection.eq(collection))
                    .filter(entries::key.eq(key))
                    .filter(entries::value.is_null())
                    .filter(entries::executor.eq(executor_id)),
            )
            .set((entries::value.eq(value_bytes), entries::value_repr.eq(value_repr), entries::created.eq(&created)))
            .execute(conn)?;
            Ok(affected == 1)
        })
    }

    fn get_entry_state(&self, collection: &str, key: &str) -> Result<EntryState, StoreError> {
        self.with_read(|conn| {
            let row: Option<(Option<Vec<u8>>, Option<i64>)> = entries::table
                .filter(entries::collection.eq(collection))
                .filter(entries::key.eq(key))
                .select((entries::value, entries::executor))
                .first(conn)
                .optional()?;

            match row {
                None => Ok(EntryState::Missing),
                Some((Some(_), _)) => Ok(EntryState::Finished),
                Some((None, None)) => Ok(EntryState::Announced),
                Some((None, Some(owner))) => {
                    if Self::is_executor_live(conn, owner)? {
                        Ok(EntryState::Announced)
                    } else {
                        Ok(EntryState::Missing)
                    }
                }
            }
        })
    }

    fn get_entry(&self, collection: &str, key: &str) -> Result<Option<StoredEntry>, StoreError> {
        self.with_read(|conn| {
            let row: Option<(Vec<u8>, Option<Vec<u8>>, Option<String>, Option<String>)> = entries::table
                .filter(entries::collection.eq(collection))
                .filter(entries::key.eq(key))
                .select((entries::config, entries::value, entries::value_repr, entries::created))
                .first(conn)
                .optional()?;
            Ok(row.map(|(config_bytes, value_bytes, value_repr, created)| StoredEntry {
                config_bytes,
                value_bytes,
                value_repr,
                created: created.and_then(|c| c.parse().ok()),
            }))
        })
    }

    fn remove_entry_by_key(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.with_write(|conn| {
            diesel::sql_query(
                "WITH RECURSIVE consumers(collection, key) AS ( \
                    SELECT collection_s, key_s FROM deps WHERE collection_t = ?1 AND key_t = ?2 \
                    UNION \
                    SELECT d.collection_s, d.key_s FROM deps d \
                    JOIN consumers c ON d.collection_t = c.collection AND d.key_t = c.key \
                 ) \
                 DELETE FROM entries \
                 WHERE (collection, key) IN (SELECT collection, key FROM consumers) \
                    OR (collection = ?1 AND key = ?2)",
            )
            .bind::<Text, _>(collection)
            .bind::<Text, _>(key)
            .execute(conn)
            .map(|_| ())
        })
    }

    fn register_executor(&self, record: &ExecutorRecord) -> Result<i64, StoreError> {
        let row = NewExecutorRow {
            created: record.created.to_rfc3339(),
            heartbeat: record.heartbeat.to_rfc3339(),
            heartbeat_interval: record.heartbeat_interval,
            stats: record.stats.as_ref().map(|v| v.to_string()),
            type_: &record.executor_type,
            version: &record.version,
            resources: record.resources.to_string(),
        };
        self.with_write(|conn| {
            diesel::insert_into(executors::table)
                .values(&row)
                .returning(executors::id)
                .get_result(conn)
        })
    }

    fn update_heartbeat(&self, id: i64) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.with_write(|conn| {
            diesel::update(executors::table.filter(executors::id.eq(id)))
                .set(executors::heartbeat.eq(&now))
                .execute(conn)
                .map(|_| ())
        })
    }

    fn update_stats(&self, id: i64, stats: &Value) -> Result<(), StoreError> {
        let encoded = stats.to_string();
        self.with_write(|conn| {
            diesel::update(executors::table.filter(executors::id.eq(id)))
                .set(executors::stats.eq(&encoded))
                .execute(conn)
                .map(|_| ())
        })
    }

    fn stop_executor(&self, id: i64) -> Result<(), StoreError> {
        self.with_write(|conn| {
            diesel::update(executors::table.filter(executors::id.eq(id)))
                .set(executors::stats.eq(None::<String>))
                .execute(conn)?;
            diesel::delete(entries::table.filter(entries::executor.eq(id)).filter(entries::value.is_null())).execute(conn)?;
            Ok(())
        })
    }

    fn unannounce_entries(&self, executor_id: i64, refs: &[(String, String)]) -> Result<(), StoreError> {
        if refs.is_empty() {
            return Ok(());
        }
        self.with_write(|conn| {
            for (collection, key) in refs {
                diesel::delete(
                    entries::table
                        .filter(entries::collection.eq(collection))
                        .filter(entries::key.eq(key))
                        .filter(entries::executor.eq(executor_id))
                        .filter(entries::value.is_null()),
                )
                .execute(conn)?;
            }
            Ok(())
        })
    }

    fn collection_summaries(&self) -> Result<Vec<CollectionSummary>, StoreError> {
        #[derive(QueryableByName)]
        struct Row {
            #[diesel(sql_type = Text)]
            name: String,
            #[diesel(sql_type = BigInt)]
            count: i64,
            #[diesel(sql_type = BigInt)]
            size: i64,
        }
        self.with_read(|conn| {
            let rows: Vec<Row> = diesel::sql_query(
                "SELECT c.name AS name, COUNT(e.key) AS count, \
                        COALESCE(SUM(LENGTH(e.config) + COALESCE(LENGTH(e.value), 0)), 0) AS size \
                 FROM collections c LEFT JOIN entries e ON e.collection = c.name \
                 GROUP BY c.name ORDER BY c.name",
            )
            .load(conn)?;
            Ok(rows.into_iter().map(|r| CollectionSummary { name: r.name, count: r.count, size: r.size }).collect())
        })
    }

    fn entry_summaries(&self, collection: &str) -> Result<Vec<EntrySummary>, StoreError> {
        #[derive(QueryableByName)]
        struct Row {
            #[diesel(sql_type = Text)]
            key: String,
            #[diesel(sql_type = BigInt)]
            size: i64,
            #[diesel(sql_type = Nullable<Text>)]
            value_repr: Option<String>,
            #[diesel(sql_type = Nullable<Text>)]
            created: Option<String>,
        }
        let collection = collection.to_string();
        self.with_read(|conn| {
            let rows: Vec<Row> = diesel::sql_query(
                "SELECT key, LENGTH(config) + COALESCE(LENGTH(value), 0) AS size, value_repr, created \
                 FROM entries WHERE collection = ?1 ORDER BY key",
            )
            .bind::<Text, _>(&collection)
            .load(conn)?;
            Ok(rows
                .into_iter()
                .map(|r| EntrySummary { key: r.key, size: r.size, value_repr: r.value_repr, created: r.created.and_then(|c| c.parse().ok()) })
                .collect())
        })
    }

    fn executor_summaries(&self) -> Result<Vec<ExecutorSummary>, StoreError> {
        self.with_read(|conn| {
            let rows: Vec<(i64, String, String, f64, Option<String>, String, String, String)> = executors::table
                .select((
                    executors::id,
                    executors::created,
                    executors::heartbeat,
                    executors::heartbeat_interval,
                    executors::stats,
                    executors::type_,
                    executors::version,
                    executors::resources,
                ))
                .load(conn)?;

            Ok(rows
                .into_iter()
                .map(|(id, created, heartbeat, interval, stats, executor_type, version, resources)| {
                    let created: DateTime<Utc> = created.parse().unwrap_or_else(|_| Utc::now());
                    let heartbeat_dt: DateTime<Utc> = heartbeat.parse().unwrap_or_else(|_| Utc::now());
                    let stats_value: Option<Value> = stats.as_deref().and_then(|s| serde_json::from_str(s).ok());
                    let status = if stats.is_none() {
                        ExecutorStatus::Stopped
                    } else {
                        let age = (Utc::now() - heartbeat_dt).num_milliseconds() as f64 / 1000.0;
                        if age <= HEARTBEAT_DEAD_FACTOR * interval { ExecutorStatus::Running } else { ExecutorStatus::Lost }
                    };
                    let resources_value: Value = serde_json::from_str(&resources).unwrap_or(Value::Null);
                    ExecutorSummary { id, created, status, stats: stats_value, executor_type, version, resources: resources_value }
                })
                .collect())
        })
    }

    fn get_run_stats(&self, _collection: &str) -> Result<RunStats, StoreError> {
        // Aesthetic only (spec §9): duration tracking is not part of the
        // announce/finish protocol, so this is an honest stub rather than an
        // approximation that would mislead an operator.
        Ok(RunStats::default())
    }
}

