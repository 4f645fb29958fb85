//! Error Types for clipstream Core
//!
//! ## Error Categories
//!
//! ### Line Errors
//! - `ParseError::MalformedLine`: empty line, wrong field count for the kind,
//!   empty field, or a field containing the batch delimiter
//! - `ParseError::UnknownKind`: second token is not a recognized event kind
//!
//! ### Payload Errors
//! - `WireError::InvalidUtf8`: a transport payload that is not valid UTF-8
//!
//! Line errors are always recoverable: callers count and skip the line.

use thiserror::Error;

/// Why a raw line was rejected by the record codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Malformed line: {0}")]
    MalformedLine(String),

    #[error("Unknown event kind: {0}")]
    UnknownKind(String),
}

impl ParseError {
    /// Short label used for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            ParseError::MalformedLine(_) => "malformed_line",
            ParseError::UnknownKind(_) => "unknown_kind",
        }
    }
}

/// Errors decoding a transport payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = ParseError::UnknownKind("SHARE".to_string());
        assert_eq!(err.to_string(), "Unknown event kind: SHARE");

        let err = ParseError::MalformedLine("expected 4 fields, got 3".to_string());
        assert!(err.to_string().contains("expected 4 fields"));
    }

    #[test]
    fn test_labels() {
        assert_eq!(ParseError::MalformedLine(String::new()).label(), "malformed_line");
        assert_eq!(ParseError::UnknownKind(String::new()).label(), "unknown_kind");
    }
}
