//! Store Error Types
//!
//! Every backend error is classified into one of four causes. The writer uses
//! the classification to decide whether a retry can help:
//!
//! - `ConnectionFailure`: the database could not be reached (transient)
//! - `Timeout`: lock contention or an expired deadline (transient)
//! - `ConstraintViolation`: the data itself was rejected (permanent)
//! - `Query`: anything else, usually a bad statement (permanent)
//!
//! Errors carry rendered messages instead of the backend error so they can be
//! cloned into per-batch reports.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

// Extended result codes keep the primary code in the low byte.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CONSTRAINT: i32 = 19;

impl StoreError {
    /// Whether retrying the same statement may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionFailure(_) | StoreError::Timeout(_)
        )
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StoreError::ConnectionFailure(_) => "connection_failure",
            StoreError::ConstraintViolation(_) => "constraint_violation",
            StoreError::Timeout(_) => "timeout",
            StoreError::Query(_) => "query",
            StoreError::Migration(_) => "migration",
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => {
                use sqlx::error::ErrorKind;
                match db.kind() {
                    ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation => {
                        return StoreError::ConstraintViolation(db.message().to_string())
                    }
                    _ => {}
                }

                let primary = db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                match primary {
                    Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => {
                        StoreError::Timeout(db.message().to_string())
                    }
                    Some(SQLITE_CONSTRAINT) => {
                        StoreError::ConstraintViolation(db.message().to_string())
                    }
                    _ => StoreError::Query(db.message().to_string()),
                }
            }
            sqlx::Error::PoolTimedOut => StoreError::Timeout(e.to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::ConnectionFailure(e.to_string()),
            _ => StoreError::Query(e.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(e.to_string())
    }
}
