//! SQLite Store Implementation
//!
//! [`SqliteStore`] implements [`Store`] over an `sqlx` connection pool.
//!
//! ## File-Based
//! ```ignore
//! // Creates the file if missing and runs migrations
//! let store = SqliteStore::open("clipstream.db").await?;
//! ```
//!
//! ## In-Memory (Testing)
//! ```ignore
//! let store = SqliteStore::new_in_memory().await?;
//! ```
//!
//! File databases use WAL so the reporting API can read while the consumer
//! writes, and a busy timeout so concurrent batch writers wait for the lock
//! instead of failing immediately. An in-memory database exists per
//! connection, so that pool is pinned to a single connection that never
//! expires.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::error::Result;
use crate::{Row, SqlValue, Store};

const DEFAULT_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed [`Store`]
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file and run migrations.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(DEFAULT_BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(path = %path.as_ref().display(), "SQLite store ready");

        Ok(Self { pool })
    }

    /// Create in-memory database (for testing)
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Close the pool, waiting for connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_all<'q>(
    sql: &'q str,
    params: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match param {
            SqlValue::Null => query.bind(None::<&str>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
        })
}

enum StorageClass {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut values = Vec::with_capacity(row.columns().len());

    for i in 0..row.columns().len() {
        let class = {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                StorageClass::Null
            } else {
                match raw.type_info().name() {
                    "INTEGER" | "BOOLEAN" => StorageClass::Integer,
                    "REAL" => StorageClass::Real,
                    "BLOB" => StorageClass::Blob,
                    _ => StorageClass::Text,
                }
            }
        };

        let value = match class {
            StorageClass::Null => SqlValue::Null,
            StorageClass::Integer => SqlValue::Integer(row.try_get::<i64, _>(i)?),
            StorageClass::Real => SqlValue::Real(row.try_get::<f64, _>(i)?),
            StorageClass::Text => SqlValue::Text(row.try_get::<String, _>(i)?),
            StorageClass::Blob => {
                let bytes = row.try_get::<Vec<u8>, _>(i)?;
                SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
        };
        values.push(value);
    }

    Ok(values)
}

#[async_trait]
impl Store for SqliteStore {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let result = bind_all(sql, params).execute(&self.pool).await?;
        debug!(rows = result.rows_affected(), params = params.len(), "Executed statement");
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let rows = bind_all(sql, params).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    #[tokio::test]
    async fn test_migrations_seed_leaderboard() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let rows = store
            .query(
                "SELECT id, most_watched_video_id, most_watched_video_count FROM leaderboard",
                &[],
            )
            .await
            .unwrap();

        assert_eq!(
            rows,
            vec![vec![SqlValue::Integer(1), SqlValue::Null, SqlValue::Integer(0)]]
        );
    }

    #[tokio::test]
    async fn test_execute_and_query_with_params() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let affected = store
            .execute(
                "INSERT INTO users (user_id, country, ip, timestamp) VALUES (?, ?, ?, ?), (?, ?, ?, ?)",
                &[
                    "49".into(),
                    "SG".into(),
                    "1.2.3.4".into(),
                    "t1".into(),
                    "50".into(),
                    "US".into(),
                    SqlValue::Null,
                    "t1".into(),
                ],
            )
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let rows = store
            .query(
                "SELECT user_id, ip FROM users WHERE country = ?",
                &["US".into()],
            )
            .await
            .unwrap();
        // Integer affinity turns the bound text id into an integer.
        assert_eq!(rows, vec![vec![SqlValue::Integer(50), SqlValue::Null]]);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_constraint_violation() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let sql = "INSERT INTO videos (video_id, user_id, timestamp) VALUES (?, ?, ?)";
        let params = ["100".into(), "49".into(), "t2".into()];

        store.execute(sql, &params).await.unwrap();
        let err = store.execute(sql, &params).await.unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_bad_statement_is_query_error() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let err = store.query("SELECT * FROM nowhere", &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
    }
}
