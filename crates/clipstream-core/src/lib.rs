//! clipstream Core
//!
//! Shared types for both ends of the ingestion pipeline:
//!
//! - [`record`]: parsing a raw activity line into a typed [`Record`]
//! - [`wire`]: the batch payload format carried by the transport, including the
//!   session control tokens and the lazy batch decoder
//!
//! Nothing in this crate performs I/O.

pub mod counts;
pub mod error;
pub mod record;
pub mod wire;

pub use counts::KindCounts;
pub use error::{ParseError, WireError};
pub use record::{parse, EventKind, EventPayload, Record};
pub use wire::{decode, ControlMessage, Message, Records, BATCH_DELIMITER};
