//! Error types for the clipstream transport.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent a frame that does not follow the broker protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The broker refused the request.
    #[error("Broker rejected request: {0}")]
    Rejected(String),

    /// The topic or connection is closed.
    #[error("Transport closed: {0}")]
    Closed(String),

    #[error("Topic '{0}' already has a subscriber")]
    AlreadySubscribed(String),
}

impl TransportError {
    /// Whether reconnecting and retrying may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Io(_) | TransportError::Closed(_))
    }
}
