//! # IPB Protocol Constants and Types
//!
//! Core wire definitions for the IPB inter-processor bus.
//!
//! ```text
//! Header: [0x4B][0x00][src][dst][seq][body_len][crc_hi][crc_lo]
//! Body:   [msg_type][payload ...][crc_hi][crc_lo]
//! ```

use std::fmt;

/// First byte of every frame header
pub const IPB_HEADER_START: u8 = 0x4B;

/// Protocol version byte
pub const IPB_PROTOCOL_VERSION: u8 = 0x00;

/// Leading byte seen while the line is idle or noisy; triggers a resync
pub const IPB_RESYNC_SENTINEL: u8 = 0x11;

/// Address used by this controller as the frame source
pub const IPB_DEFAULT_SOURCE_ADDRESS: u8 = 0xFE;

/// Broadcast destination address
pub const IPB_BROADCAST_ADDRESS: u8 = 0xFF;

/// Header bytes covered by the header checksum
pub const IPB_HEADER_PREFIX_SIZE: usize = 6;

/// Complete header size including its checksum
pub const IPB_HEADER_SIZE: usize = 8;

/// Bytes read before deciding whether the line is idle
pub const IPB_SYNC_PROBE_SIZE: usize = 5;

/// Checksum size (both header and body)
pub const IPB_CHECKSUM_SIZE: usize = 2;

/// Index of the body length byte inside the header
pub const IPB_BODY_LENGTH_INDEX: usize = 5;

/// Maximum payload when the body length counts message type + payload
pub const IPB_MAX_PAYLOAD_SIZE: usize = u8::MAX as usize - 1;

/// Maximum payload when the body length also counts the body checksum
pub const IPB_MAX_PAYLOAD_SIZE_WITH_CHECKSUM: usize = u8::MAX as usize - 3;

/// IPB message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Write an ERD value
    WriteRequest,
    /// Unsolicited ERD value broadcast
    Publish,
    /// Start/pause button request
    StartPauseRequest,
    /// Safety key exchange, not resource addressed
    SafetyKey,
    /// Line test
    LineTestRequest,
    /// Bulk data transfer
    DataTransferRequest,
    /// Request for an ERD value
    ReadRequest,
}

impl MessageType {
    /// All known message types, in wire order
    pub const ALL: [MessageType; 7] = [
        MessageType::WriteRequest,
        MessageType::Publish,
        MessageType::StartPauseRequest,
        MessageType::SafetyKey,
        MessageType::LineTestRequest,
        MessageType::DataTransferRequest,
        MessageType::ReadRequest,
    ];

    /// Map a wire byte to a message type; unknown bytes yield `None`
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x21 => Some(MessageType::WriteRequest),
            0x22 => Some(MessageType::Publish),
            0x23 => Some(MessageType::StartPauseRequest),
            0x24 => Some(MessageType::SafetyKey),
            0x25 => Some(MessageType::LineTestRequest),
            0x26 => Some(MessageType::DataTransferRequest),
            0x27 => Some(MessageType::ReadRequest),
            _ => None,
        }
    }

    /// Wire byte for this message type
    pub fn as_byte(self) -> u8 {
        match self {
            MessageType::WriteRequest => 0x21,
            MessageType::Publish => 0x22,
            MessageType::StartPauseRequest => 0x23,
            MessageType::SafetyKey => 0x24,
            MessageType::LineTestRequest => 0x25,
            MessageType::DataTransferRequest => 0x26,
            MessageType::ReadRequest => 0x27,
        }
    }

    /// Human-readable label used in decoded output
    pub fn label(self) -> &'static str {
        match self {
            MessageType::WriteRequest => "Write Request",
            MessageType::Publish => "Publish",
            MessageType::StartPauseRequest => "Start/Pause Request",
            MessageType::SafetyKey => "IPB Safety Key",
            MessageType::LineTestRequest => "Line Test Request",
            MessageType::DataTransferRequest => "Data Transfer Request",
            MessageType::ReadRequest => "Read Request",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Validated header fields of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Source address
    pub source: u8,

    /// Destination address
    pub destination: u8,

    /// Sequence number
    pub sequence: u8,

    /// Raw body length field
    pub body_length: u8,
}

impl FrameHeader {
    /// Parse the 6 checksummed header bytes
    pub fn from_prefix(prefix: &[u8; IPB_HEADER_PREFIX_SIZE]) -> Self {
        Self {
            source: prefix[2],
            destination: prefix[3],
            sequence: prefix[4],
            body_length: prefix[IPB_BODY_LENGTH_INDEX],
        }
    }
}

/// A validated IPB frame body
///
/// The message type is kept as a raw byte: unknown types are valid on the
/// wire and only skipped by the field decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header fields the frame arrived with
    pub header: FrameHeader,

    /// Raw message type byte
    pub message_type: u8,

    /// Payload between the message type and the body checksum
    pub payload: Vec<u8>,
}

impl Frame {
    /// Known message type, if any
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_byte(self.message_type)
    }
}
