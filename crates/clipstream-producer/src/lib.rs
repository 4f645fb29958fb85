//! clipstream Producer
//!
//! Reads an event dump line by line, validates each line with the record
//! codec, and publishes the valid records as fixed-size batches framed by
//! `SESS_START` / `SESS_END`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    ┌─────────────┐    ┌──────────────┐    ┌────────────┐
//! │ AsyncBufRead │───▶│ parse(line) │───▶│ BatchBuffer  │───▶│ Publisher  │
//! │ (dump file)  │    │ drop errors │    │ "r1|r2|...|" │    │ (topic)    │
//! └──────────────┘    │ drop LIKE   │    └──────────────┘    └────────────┘
//!                     └─────────────┘
//! ```
//!
//! See [`framer`] for the exact message sequence.

pub mod batch;
pub mod error;
pub mod framer;
pub mod stats;

pub use batch::BatchBuffer;
pub use error::{ProducerError, Result};
pub use framer::{BatchFramer, FramerConfig};
pub use stats::ProducerStats;
