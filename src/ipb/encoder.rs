//! # IPB Frame Encoder
//!
//! Builds outgoing IPB frames: an 8-byte checksummed header followed by a
//! checksummed body carrying the message type and payload.

use bytes::{BufMut, BytesMut};

use super::crc::ipb_checksum;
use super::protocol::*;
use crate::error::{IpbError, Result};

/// How outgoing frames are numbered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencePolicy {
    /// Every frame carries the same sequence number
    Fixed(u8),
    /// Start at the given number and increment per frame, wrapping at 256
    Incrementing(u8),
}

impl Default for SequencePolicy {
    fn default() -> Self {
        SequencePolicy::Fixed(0)
    }
}

/// Addressing and length conventions shared by encoder and decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Source address written into outgoing headers
    pub source: u8,

    /// Destination address written into outgoing headers
    pub destination: u8,

    /// Whether the body length field also counts the 2-byte body checksum
    pub length_includes_checksum: bool,
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self {
            source: IPB_DEFAULT_SOURCE_ADDRESS,
            destination: IPB_BROADCAST_ADDRESS,
            length_includes_checksum: false,
        }
    }
}

impl FrameFormat {
    /// Largest payload the body length byte can describe
    pub fn max_payload_size(&self) -> usize {
        if self.length_includes_checksum {
            IPB_MAX_PAYLOAD_SIZE_WITH_CHECKSUM
        } else {
            IPB_MAX_PAYLOAD_SIZE
        }
    }

    /// Body length field for a payload of `payload_len` bytes
    ///
    /// Callers must have checked `payload_len <= max_payload_size()`.
    pub fn body_length_field(&self, payload_len: usize) -> u8 {
        let extra = if self.length_includes_checksum { IPB_CHECKSUM_SIZE } else { 0 };
        (1 + payload_len + extra) as u8
    }

    /// Bytes following the header for a given body length field,
    /// including the body checksum
    ///
    /// Returns `None` when the field is too small to hold a message type.
    pub fn body_read_size(&self, body_length: u8) -> Option<usize> {
        let body_length = body_length as usize;
        if self.length_includes_checksum {
            (body_length > IPB_CHECKSUM_SIZE).then_some(body_length)
        } else {
            (body_length > 0).then_some(body_length + IPB_CHECKSUM_SIZE)
        }
    }
}

/// Encode a frame with the default addressing and sequence number zero
///
/// # Arguments
///
/// * `message_type` - IPB message type
/// * `payload` - Message payload (ERD id, data byte count, data)
///
/// # Returns
///
/// * `Result<Vec<u8>>` - Header followed by body
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the payload does not fit the body length byte
///
/// # Examples
///
/// ```
/// use ipb_bus::ipb::encoder::encode_frame;
/// use ipb_bus::ipb::protocol::MessageType;
///
/// let frame = encode_frame(MessageType::ReadRequest, &[0xF3, 0x01]).unwrap();
/// assert_eq!(&frame[..6], &[0x4B, 0x00, 0xFE, 0xFF, 0x00, 0x03]);
/// ```
pub fn encode_frame(message_type: MessageType, payload: &[u8]) -> Result<Vec<u8>> {
    encode_frame_with(&FrameFormat::default(), 0, message_type.as_byte(), payload)
}

/// Encode a frame with explicit format, sequence number and raw type byte
pub fn encode_frame_with(
    format: &FrameFormat,
    sequence: u8,
    message_type: u8,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let max = format.max_payload_size();
    if payload.len() > max {
        return Err(IpbError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }

    let mut frame = BytesMut::with_capacity(IPB_HEADER_SIZE + 1 + payload.len() + IPB_CHECKSUM_SIZE);

    frame.put_u8(IPB_HEADER_START);
    frame.put_u8(IPB_PROTOCOL_VERSION);
    frame.put_u8(format.source);
    frame.put_u8(format.destination);
    frame.put_u8(sequence);
    frame.put_u8(format.body_length_field(payload.len()));
    let header_crc = ipb_checksum(&frame[..IPB_HEADER_PREFIX_SIZE]);
    frame.put_u16(header_crc);

    frame.put_u8(message_type);
    frame.put_slice(payload);
    let body_crc = ipb_checksum(&frame[IPB_HEADER_SIZE..]);
    frame.put_u16(body_crc);

    Ok(frame.to_vec())
}

/// Stateful encoder applying a frame format and sequence policy
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    format: FrameFormat,
    policy: SequencePolicy,
    next_sequence: u8,
}

impl FrameEncoder {
    /// Create an encoder
    pub fn new(format: FrameFormat, policy: SequencePolicy) -> Self {
        let next_sequence = match policy {
            SequencePolicy::Fixed(seq) | SequencePolicy::Incrementing(seq) => seq,
        };

        Self {
            format,
            policy,
            next_sequence,
        }
    }

    /// Frame format in use
    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    /// Sequence number the next frame will carry
    pub fn next_sequence(&self) -> u8 {
        self.next_sequence
    }

    /// Encode a frame, advancing the sequence number per the policy
    ///
    /// The sequence number only advances when encoding succeeds.
    pub fn encode(&mut self, message_type: MessageType, payload: &[u8]) -> Result<Vec<u8>> {
        let frame = encode_frame_with(&self.format, self.next_sequence, message_type.as_byte(), payload)?;

        if let SequencePolicy::Incrementing(_) = self.policy {
            self.next_sequence = self.next_sequence.wrapping_add(1);
        }

        Ok(frame)
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(FrameFormat::default(), SequencePolicy::default())
    }
}
