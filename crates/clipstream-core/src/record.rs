//! Record Codec
//!
//! This module turns one raw activity line into a typed [`Record`].
//!
//! ## Line Format
//!
//! Tokens are separated by a single space:
//!
//! ```text
//! <timestamp> REGISTER <user_id> <country> <ip>
//! <timestamp> UPLOAD   <user_id> <video_id>
//! <timestamp> WATCH    <user_id> <video_id>
//! <timestamp> LIKE     <user_id> <video_id>
//! ```
//!
//! The timestamp is opaque: it is carried and stored verbatim, never reparsed.
//!
//! ## Field Sets
//!
//! The kind-specific fields live in [`EventPayload`], so a record's field set is
//! fixed by its kind at the type level. A REGISTER can never carry a video id and
//! a WATCH can never carry a country.
//!
//! ## Example
//! ```ignore
//! let record = parse("2014-08-12T02:14:33-04:00 REGISTER 49 SG 174.2.25.21")?;
//! assert_eq!(record.kind(), EventKind::Register);
//! assert_eq!(record.country(), Some("SG"));
//! assert_eq!(record.video_id(), None);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::wire::BATCH_DELIMITER;

/// Field separator inside a line.
const FIELD_SEPARATOR: char = ' ';

/// Field count of a REGISTER line.
const REGISTER_FIELDS: usize = 5;

/// Field count of UPLOAD, WATCH and LIKE lines.
const VIDEO_EVENT_FIELDS: usize = 4;

/// The four recognized event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Register,
    Upload,
    Watch,
    Like,
}

impl EventKind {
    /// All kinds, in reporting order.
    pub const ALL: [EventKind; 4] = [
        EventKind::Register,
        EventKind::Upload,
        EventKind::Watch,
        EventKind::Like,
    ];

    /// The token used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Register => "REGISTER",
            EventKind::Upload => "UPLOAD",
            EventKind::Watch => "WATCH",
            EventKind::Like => "LIKE",
        }
    }

    /// Number of space-separated fields a line of this kind must have.
    pub fn field_count(&self) -> usize {
        match self {
            EventKind::Register => REGISTER_FIELDS,
            _ => VIDEO_EVENT_FIELDS,
        }
    }

    /// Whether records of this kind are persisted downstream.
    ///
    /// LIKE events are validated and counted but shed before batching.
    pub fn is_persisted(&self) -> bool {
        !matches!(self, EventKind::Like)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REGISTER" => Ok(EventKind::Register),
            "UPLOAD" => Ok(EventKind::Upload),
            "WATCH" => Ok(EventKind::Watch),
            "LIKE" => Ok(EventKind::Like),
            other => Err(ParseError::UnknownKind(other.to_string())),
        }
    }
}

/// Kind-specific fields of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    Register { country: String, ip: String },
    Upload { video_id: String },
    Watch { video_id: String },
    Like { video_id: String },
}

/// A single validated activity event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Event time, verbatim from the source line
    pub timestamp: String,

    /// Acting user
    pub user_id: String,

    /// Kind and kind-specific fields
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Record {
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Register { .. } => EventKind::Register,
            EventPayload::Upload { .. } => EventKind::Upload,
            EventPayload::Watch { .. } => EventKind::Watch,
            EventPayload::Like { .. } => EventKind::Like,
        }
    }

    /// Video id for UPLOAD, WATCH and LIKE records.
    pub fn video_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Upload { video_id }
            | EventPayload::Watch { video_id }
            | EventPayload::Like { video_id } => Some(video_id),
            EventPayload::Register { .. } => None,
        }
    }

    /// Country for REGISTER records.
    pub fn country(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Register { country, .. } => Some(country),
            _ => None,
        }
    }

    /// IP address for REGISTER records.
    pub fn ip(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Register { ip, .. } => Some(ip),
            _ => None,
        }
    }
}

/// Renders the canonical line; `parse(&record.to_string())` yields the record back.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.timestamp, self.kind(), self.user_id)?;
        match &self.payload {
            EventPayload::Register { country, ip } => write!(f, " {} {}", country, ip),
            EventPayload::Upload { video_id }
            | EventPayload::Watch { video_id }
            | EventPayload::Like { video_id } => write!(f, " {}", video_id),
        }
    }
}

impl FromStr for Record {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parse one raw line into a [`Record`].
///
/// # Errors
///
/// - `MalformedLine` on empty input, when the kind cannot be inferred, on a field
///   count that does not match the kind, on an empty field, or when the line
///   contains the batch delimiter
/// - `UnknownKind` when the second token is not a recognized kind
pub fn parse(line: &str) -> Result<Record, ParseError> {
    if line.is_empty() {
        return Err(ParseError::MalformedLine("empty line".to_string()));
    }

    if line.contains(BATCH_DELIMITER) {
        return Err(ParseError::MalformedLine(format!(
            "line contains reserved delimiter '{}'",
            BATCH_DELIMITER
        )));
    }

    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() < 2 {
        return Err(ParseError::MalformedLine(format!(
            "expected at least 2 fields, got {}",
            fields.len()
        )));
    }

    if let Some(position) = fields.iter().position(|f| f.is_empty()) {
        return Err(ParseError::MalformedLine(format!(
            "field {} is empty",
            position + 1
        )));
    }

    let kind: EventKind = fields[1].parse()?;

    if fields.len() != kind.field_count() {
        return Err(ParseError::MalformedLine(format!(
            "{} expects {} fields, got {}",
            kind,
            kind.field_count(),
            fields.len()
        )));
    }

    let payload = match kind {
        EventKind::Register => EventPayload::Register {
            country: fields[3].to_string(),
            ip: fields[4].to_string(),
        },
        EventKind::Upload => EventPayload::Upload {
            video_id: fields[3].to_string(),
        },
        EventKind::Watch => EventPayload::Watch {
            video_id: fields[3].to_string(),
        },
        EventKind::Like => EventPayload::Like {
            video_id: fields[3].to_string(),
        },
    };

    Ok(Record {
        timestamp: fields[0].to_string(),
        user_id: fields[2].to_string(),
        payload,
    })
}
