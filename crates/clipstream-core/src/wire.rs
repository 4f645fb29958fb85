//! Batch Wire Format
//!
//! Every transport message is one of:
//!
//! - a **control token**: the literal `SESS_START` or `SESS_END`, marking the
//!   boundaries of one ingestion run
//! - a **batch**: raw record lines joined by `|`, usually with a trailing `|`
//!
//! ```text
//! SESS_START
//! t1 REGISTER 49 SG 1.2.3.4|t2 UPLOAD 49 100|t3 WATCH 49 100|
//! t4 WATCH 50 100|
//! SESS_END
//! ```
//!
//! The record codec rejects any line containing `|`, so the delimiter never
//! collides with field content.
//!
//! ## Decoding
//!
//! [`decode`] classifies a payload and, for batches, returns a lazy
//! [`Records`] iterator. Lines that fail the codec are skipped and remembered on
//! the iterator, so one bad line never poisons the batch.

use std::fmt;
use std::str::Split;

use bytes::Bytes;

use crate::error::{ParseError, WireError};
use crate::record::{parse, Record};

/// Separator between records in a batch payload.
pub const BATCH_DELIMITER: char = '|';

/// Session control tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMessage {
    SessionStart,
    SessionEnd,
}

impl ControlMessage {
    pub const SESSION_START_TOKEN: &'static str = "SESS_START";
    pub const SESSION_END_TOKEN: &'static str = "SESS_END";

    pub fn token(&self) -> &'static str {
        match self {
            ControlMessage::SessionStart => Self::SESSION_START_TOKEN,
            ControlMessage::SessionEnd => Self::SESSION_END_TOKEN,
        }
    }

    /// Recognize a control token. Anything else is not a control message.
    pub fn from_token(payload: &str) -> Option<Self> {
        match payload {
            Self::SESSION_START_TOKEN => Some(ControlMessage::SessionStart),
            Self::SESSION_END_TOKEN => Some(ControlMessage::SessionEnd),
            _ => None,
        }
    }

    /// Encode as a transport payload.
    pub fn to_payload(&self) -> Bytes {
        Bytes::from_static(self.token().as_bytes())
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A decoded transport payload.
#[derive(Debug)]
pub enum Message<'a> {
    Control(ControlMessage),
    Batch(Records<'a>),
}

/// Decode one transport payload.
///
/// # Errors
///
/// `WireError::InvalidUtf8` if the payload is not UTF-8. Per-line problems are
/// never errors here; they are collected by the returned [`Records`].
pub fn decode(payload: &[u8]) -> Result<Message<'_>, WireError> {
    let text = std::str::from_utf8(payload).map_err(|e| WireError::InvalidUtf8(e.to_string()))?;

    if let Some(control) = ControlMessage::from_token(text) {
        return Ok(Message::Control(control));
    }

    Ok(Message::Batch(Records::new(text)))
}

/// Lazy iterator over the valid records of one batch payload.
///
/// The iterator is finite and single-pass. Rejected lines are kept, in order,
/// and can be inspected with [`Records::errors`] once iteration is done.
#[derive(Debug)]
pub struct Records<'a> {
    pieces: std::iter::Peekable<Split<'a, char>>,
    errors: Vec<(String, ParseError)>,
}

impl<'a> Records<'a> {
    fn new(payload: &'a str) -> Self {
        Self {
            pieces: payload.split(BATCH_DELIMITER).peekable(),
            errors: Vec::new(),
        }
    }

    /// Lines rejected so far, with the reason.
    pub fn errors(&self) -> &[(String, ParseError)] {
        &self.errors
    }

    /// Number of lines rejected so far.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let piece = self.pieces.next()?;

            // The last piece is empty when the payload ends with a separator,
            // or when the payload itself is empty.
            if piece.is_empty() && self.pieces.peek().is_none() {
                return None;
            }

            match parse(piece) {
                Ok(record) => return Some(record),
                Err(e) => self.errors.push((piece.to_string(), e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EventKind;

    #[test]
    fn test_decode_control_tokens() {
        assert!(matches!(
            decode(b"SESS_START").unwrap(),
            Message::Control(ControlMessage::SessionStart)
        ));
        assert!(matches!(
            decode(b"SESS_END").unwrap(),
            Message::Control(ControlMessage::SessionEnd)
        ));
    }

    #[test]
    fn test_control_token_roundtrip() {
        for control in [ControlMessage::SessionStart, ControlMessage::SessionEnd] {
            let payload = control.to_payload();
            assert!(matches!(decode(&payload).unwrap(), Message::Control(c) if c == control));
        }
    }

    #[test]
    fn test_control_tokens_are_exact() {
        // Near-misses are data, and fail as records.
        let Message::Batch(mut records) = decode(b"SESS_START ").unwrap() else {
            panic!("expected a batch");
        };
        assert!(records.next().is_none());
        assert_eq!(records.error_count(), 1);
    }

    #[test]
    fn test_decode_batch_with_trailing_separator() {
        let payload =
            b"t1 REGISTER 49 SG 1.2.3.4|t2 UPLOAD 49 100|t3 WATCH 49 100|t3 WATCH 50 100|";
        let Message::Batch(mut records) = decode(payload).unwrap() else {
            panic!("expected a batch");
        };

        let decoded: Vec<Record> = records.by_ref().collect();
        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[0].kind(), EventKind::Register);
        assert_eq!(decoded[1].kind(), EventKind::Upload);
        assert_eq!(decoded[3].user_id, "50");
        assert_eq!(records.error_count(), 0);
    }

    #[test]
    fn test_decode_batch_without_trailing_separator() {
        let Message::Batch(records) = decode(b"t WATCH 1 2|t WATCH 3 4").unwrap() else {
            panic!("expected a batch");
        };
        assert_eq!(records.count(), 2);
    }

    #[test]
    fn test_decode_skips_bad_lines() {
        let Message::Batch(mut records) =
            decode(b"t WATCH 1 2|garbage|t SHARE 1 2||t WATCH 3 4|").unwrap()
        else {
            panic!("expected a batch");
        };

        let decoded: Vec<Record> = records.by_ref().collect();
        assert_eq!(decoded.len(), 2);
        // "garbage", the unknown kind, and the empty piece in the middle
        assert_eq!(records.error_count(), 3);
        assert!(matches!(records.errors()[1].1, ParseError::UnknownKind(_)));
    }

    #[test]
    fn test_decode_empty_payload() {
        let Message::Batch(mut records) = decode(b"").unwrap() else {
            panic!("expected a batch");
        };
        assert!(records.next().is_none());
        assert_eq!(records.error_count(), 0);
    }

    #[test]
    fn test_decode_invalid_utf8() {
        assert!(matches!(
            decode(&[0xff, 0xfe, b'|']),
            Err(WireError::InvalidUtf8(_))
        ));
    }
}
