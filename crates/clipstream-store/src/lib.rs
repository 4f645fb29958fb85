//! clipstream Store
//!
//! The relational store the consumer writes into and the reporting API reads
//! from.
//!
//! ## Interface
//!
//! [`Store`] has two operations: `execute` for statements and `query` for
//! reads, both taking positional `?` parameters as [`SqlValue`]s. Values are
//! always bound, never spliced into the SQL text.
//!
//! ```ignore
//! use clipstream_store::{SqlValue, SqliteStore, Store};
//!
//! let store = SqliteStore::open("clipstream.db").await?;
//! store
//!     .execute(
//!         "INSERT INTO videos (video_id, user_id, timestamp) VALUES (?, ?, ?)",
//!         &[SqlValue::from("100"), SqlValue::from("49"), SqlValue::from("t2")],
//!     )
//!     .await?;
//!
//! let rows = store
//!     .query("SELECT video_id FROM videos WHERE user_id = ?", &[SqlValue::from("49")])
//!     .await?;
//! ```
//!
//! ## Schema
//!
//! Migrations in `migrations/` are embedded and run by [`SqliteStore::open`]:
//! `users`, `videos`, `views` and the single-row `leaderboard`.

use async_trait::async_trait;
use serde::Serialize;

pub mod error;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;

/// A bound parameter or a column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Integer value, also accepting integer-looking text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Render a non-null value as text, the way ids are handled in memory.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(v) => Some(v.to_string()),
            SqlValue::Real(v) => Some(v.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// One result row, columns in select order.
pub type Row = Vec<SqlValue>;

/// Parameterized access to a relational store.
///
/// Implementations must be safe to share across tasks (`Arc<dyn Store>`).
#[async_trait]
pub trait Store: Send + Sync {
    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run a query and return all rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;
}
