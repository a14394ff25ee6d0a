use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::domain::repository::{StoreError, StoreResult};

/// Opens a pool for `database_url`, creating the database file when missing.
///
/// In-memory databases live inside a single connection, so they get a pool of
/// exactly one connection that is never recycled.
pub async fn connect(database_url: &str) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool_options = if is_in_memory(database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };
    let pool = pool_options.connect_with(options).await?;
    tracing::debug!(database_url, "sqlite pool ready");
    Ok(pool)
}

pub fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // SQLite reports "UNIQUE constraint failed: <table>.<column>".
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                let target = db.message().rsplit_once(": ").map_or("", |(_, t)| t);
                let column = target.rsplit('.').next().unwrap_or(target);
                StoreError::Conflict(column.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
                StoreError::Corrupt(err.to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}
