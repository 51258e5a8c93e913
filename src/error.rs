//! # Error Types
//!
//! Custom error types for the IPB bus controller using `thiserror`.

use std::fmt;

use thiserror::Error;

use crate::erd::schema::ErdId;

/// Frame section protected by its own checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSection {
    /// The 6 header bytes preceding the header checksum
    Header,
    /// Message type plus payload
    Body,
}

impl fmt::Display for FrameSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameSection::Header => f.write_str("header"),
            FrameSection::Body => f.write_str("body"),
        }
    }
}

/// Main error type for the IPB bus controller
#[derive(Debug, Error)]
pub enum IpbError {
    /// Header or body checksum did not validate
    #[error("{section} checksum mismatch: computed 0x{expected:04X}, received 0x{actual:04X}")]
    ChecksumMismatch {
        section: FrameSection,
        expected: u16,
        actual: u16,
    },

    /// Frame structure is unusable (truncated, empty body, trailing bytes)
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// No ERD definition registered for the id
    #[error("ERD {0} not found in dictionary")]
    SchemaNotFound(ErdId),

    /// Requested value is not allowed for the ERD's primary field
    #[error("Value '{value}' is not a valid command for ERD {erd}")]
    InvalidCommandValue { erd: ErdId, value: String },

    /// Payload does not fit the 1-byte body length field
    #[error("Payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Payload shorter than the schema's offset + size for a field
    #[error("Payload too short for field '{field}': need {needed} bytes, have {available}")]
    PayloadTooShort {
        field: String,
        needed: usize,
        available: usize,
    },

    /// Field declaration the decoder cannot render
    #[error("Unsupported field: {0}")]
    UnsupportedField(String),

    /// Transport read/write failure
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// ERD dictionary parse errors
    #[error("ERD dictionary error: {0}")]
    Dictionary(#[from] serde_json::Error),
}

impl IpbError {
    /// Bus noise that the reception loop recovers from by resynchronizing
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IpbError::ChecksumMismatch { .. } | IpbError::MalformedFrame(_)
        )
    }
}

/// Result type alias for the IPB bus controller
pub type Result<T> = std::result::Result<T, IpbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_mismatch_is_recoverable() {
        let err = IpbError::ChecksumMismatch {
            section: FrameSection::Header,
            expected: 0xD3C4,
            actual: 0x0000,
        };
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "header checksum mismatch: computed 0xD3C4, received 0x0000"
        );
    }

    #[test]
    fn test_transport_error_is_fatal() {
        let err = IpbError::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(!err.is_recoverable());
        assert!(!IpbError::SchemaNotFound(ErdId(0xF012)).is_recoverable());
    }

    #[test]
    fn test_schema_not_found_message() {
        let err = IpbError::SchemaNotFound(ErdId(0xF301));
        assert_eq!(err.to_string(), "ERD 0xF301 not found in dictionary");
    }
}
