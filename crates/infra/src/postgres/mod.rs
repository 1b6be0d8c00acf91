//! Postgres adapters (sqlx, runtime-checked queries).

mod audit;
mod directory;
mod refresh;

pub use audit::PgAuditLog;
pub use directory::PgDirectory;
pub use refresh::PgRefreshTokens;

use keygate_auth::StoreError;
use sqlx::PgPool;

/// `CREATE ... IF NOT EXISTS` for every table the adapters touch.
pub const SCHEMA: &str = include_str!("schema.sql");

pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    PgPool::connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    Ok(())
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                // unique / foreign-key violation
                Some("23505") | Some("23503") => StoreError::Conflict(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(operation.to_string()),
        other => StoreError::Unavailable(format!("{operation}: {other}")),
    }
}

/// Replace the driver's conflict text with a caller-correctable message.
pub(crate) fn conflict_as(message: &'static str) -> impl Fn(StoreError) -> StoreError {
    move |err| match err {
        StoreError::Conflict(_) => StoreError::Conflict(message.to_string()),
        other => other,
    }
}
