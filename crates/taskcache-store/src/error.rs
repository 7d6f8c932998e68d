//! Maps Diesel/r2d2 errors onto `taskcache_core::store::StoreError`, the
//! transport-agnostic error type the Planner/Runtime reason about.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use taskcache_core::store::StoreError;

pub fn map_diesel_error(err: DieselError) -> StoreError {
    match err {
        DieselError::NotFound => StoreError::NotFound,
        DieselError::DatabaseError(kind, info) => match kind {
            DatabaseErrorKind::UniqueViolation => StoreError::UniqueViolation(info.message().to_string()),
            DatabaseErrorKind::ForeignKeyViolation => StoreError::ForeignKeyViolation(info.message().to_string()),
            _ => {
                let message = info.message().to_lowercase();
                if message.contains("locked") || message.contains("busy") {
                    StoreError::WriteLockTimeout
                } else {
                    StoreError::Unknown(format!("{kind:?}: {}", info.message()))
                }
            }
        },
        other => StoreError::Unknown(other.to_string()),
    }
}

/// Pool checkout failures (exhausted pool, broken connection customizer)
/// surface as plain `Display` text rather than a concrete r2d2 error type,
/// since `diesel::r2d2` re-exports shift between Diesel releases.
pub fn map_pool_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Unknown(format!("connection pool error: {err}"))
}
