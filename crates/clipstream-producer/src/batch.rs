//! Batch buffer for the producer.
//!
//! Records are appended as canonical lines, each followed by the batch
//! delimiter, so a drained buffer is already a valid batch payload.
//!
//! ```text
//! append(r1) append(r2) ... append(rN)      N == max_batch_size
//!        │                                         │
//!        ▼                                         ▼
//! "r1|r2|...|"  ── should_flush() ──▶ drain() ──▶ Bytes
//! ```
//!
//! The buffer only flushes on record count. A partial batch is flushed
//! explicitly at end of input.

use bytes::Bytes;
use clipstream_core::{Record, BATCH_DELIMITER};
use tracing::{debug, trace};

/// Buffer for one outgoing batch.
///
/// NOT thread-safe; the producer owns it exclusively.
#[derive(Debug)]
pub struct BatchBuffer {
    /// Encoded lines, each followed by the delimiter
    payload: String,

    /// Number of records in `payload`
    record_count: usize,

    /// Maximum number of records per batch
    max_batch_size: usize,
}

impl BatchBuffer {
    /// Create a new empty batch buffer. A `max_batch_size` of 0 is treated as 1.
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            payload: String::new(),
            record_count: 0,
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Append a record to the batch.
    pub fn append(&mut self, record: &Record) {
        use std::fmt::Write;

        // Writing into a String cannot fail.
        let _ = write!(self.payload, "{}", record);
        self.payload.push(BATCH_DELIMITER);
        self.record_count += 1;
        trace!(
            record_count = self.record_count,
            size_bytes = self.payload.len(),
            "Appended record to batch"
        );
    }

    /// Check if this batch is full.
    pub fn should_flush(&self) -> bool {
        self.record_count >= self.max_batch_size
    }

    /// Take the encoded payload and reset the buffer.
    pub fn drain(&mut self) -> Bytes {
        let payload = std::mem::take(&mut self.payload);
        let record_count = std::mem::replace(&mut self.record_count, 0);
        debug!(record_count, size_bytes = payload.len(), "Drained batch buffer");
        Bytes::from(payload)
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn len(&self) -> usize {
        self.record_count
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
