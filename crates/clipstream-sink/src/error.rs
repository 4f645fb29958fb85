//! Error types for the sink.
//!
//! - [`WriteError`]: one entity write of one batch failed. Carried by the
//!   batch's barrier slot into the session report.
//! - [`RecalcError`]: the leaderboard recompute at session end failed.
//! - [`SinkError`]: the consumer could not start or lost its subscription.

use std::time::Duration;

use clipstream_store::StoreError;
use clipstream_transport::TransportError;
use thiserror::Error;

use crate::aggregate::Entity;

pub type Result<T> = std::result::Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Write to {entity} failed after {attempts} attempt(s): {source}")]
pub struct WriteError {
    pub entity: Entity,
    pub attempts: u32,
    #[source]
    pub source: StoreError,
}

impl WriteError {
    /// Metric label for the failure cause.
    pub fn cause(&self) -> &'static str {
        self.source.label()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecalcError {
    /// No views have been stored yet; the leaderboard is left untouched.
    #[error("No view history to rank")]
    NoData,

    #[error("Leaderboard query failed: {0}")]
    QueryFailure(StoreError),

    /// Shutdown was requested before the session ended.
    #[error("Recompute skipped: shutting down")]
    Cancelled,
}

impl RecalcError {
    pub(crate) fn timed_out(after: Duration) -> Self {
        RecalcError::QueryFailure(StoreError::Timeout(format!(
            "recompute exceeded {}ms",
            after.as_millis()
        )))
    }
}

impl From<StoreError> for RecalcError {
    fn from(e: StoreError) -> Self {
        RecalcError::QueryFailure(e)
    }
}
