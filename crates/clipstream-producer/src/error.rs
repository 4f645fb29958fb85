//! Error types for the producer.

use clipstream_transport::TransportError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProducerError>;

#[derive(Debug, Error)]
pub enum ProducerError {
    /// Publishing a batch or control message failed; the run is aborted.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Reading the input failed.
    #[error("Input error: {0}")]
    Io(#[from] std::io::Error),
}
