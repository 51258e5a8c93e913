//! # IPB Frame Decoder
//!
//! Validates and splits incoming IPB frames, either from a complete byte
//! slice or from a live transport stream with resynchronization.

use bytes::{Buf, BytesMut};
use tracing::trace;

use super::crc::ipb_checksum;
use super::encoder::FrameFormat;
use super::protocol::*;
use crate::error::{FrameSection, IpbError, Result};
use crate::serial::port_trait::Transport;

/// Largest frame the reader can be asked to buffer
const MAX_FRAME_SIZE: usize = IPB_HEADER_SIZE + u8::MAX as usize + IPB_CHECKSUM_SIZE;

/// Validate an 8-byte header and return its fields
///
/// # Errors
///
/// Returns `ChecksumMismatch` with section `Header` if the checksum over the
/// first 6 bytes does not match the trailing big-endian checksum, and
/// `MalformedFrame` if a checksummed header carries the wrong start byte or
/// protocol version.
pub fn validate_header(header: &[u8; IPB_HEADER_SIZE]) -> Result<FrameHeader> {
    let mut prefix = [0u8; IPB_HEADER_PREFIX_SIZE];
    prefix.copy_from_slice(&header[..IPB_HEADER_PREFIX_SIZE]);

    let expected = ipb_checksum(&prefix);
    let actual = u16::from_be_bytes([header[6], header[7]]);
    if expected != actual {
        return Err(IpbError::ChecksumMismatch {
            section: FrameSection::Header,
            expected,
            actual,
        });
    }

    if header[0] != IPB_HEADER_START || header[1] != IPB_PROTOCOL_VERSION {
        return Err(IpbError::MalformedFrame(format!(
            "unexpected header start 0x{:02X} / version 0x{:02X}",
            header[0], header[1]
        )));
    }

    Ok(FrameHeader::from_prefix(&prefix))
}

/// Validate a body (message type + payload + checksum) and build the frame
///
/// # Errors
///
/// Returns `MalformedFrame` if the body has no message type byte, or
/// `ChecksumMismatch` with section `Body` if the checksum fails.
pub fn validate_body(header: FrameHeader, body: &[u8]) -> Result<Frame> {
    if body.len() < 1 + IPB_CHECKSUM_SIZE {
        return Err(IpbError::MalformedFrame(format!(
            "body of {} bytes has no message type",
            body.len()
        )));
    }

    let (content, crc) = body.split_at(body.len() - IPB_CHECKSUM_SIZE);
    let expected = ipb_checksum(content);
    let actual = u16::from_be_bytes([crc[0], crc[1]]);
    if expected != actual {
        return Err(IpbError::ChecksumMismatch {
            section: FrameSection::Body,
            expected,
            actual,
        });
    }

    Ok(Frame {
        header,
        message_type: content[0],
        payload: content[1..].to_vec(),
    })
}

/// Decode a complete frame held in memory
///
/// # Arguments
///
/// * `format` - Length convention the sender used
/// * `bytes` - Exactly one frame: header followed by body
///
/// # Returns
///
/// * `Result<Frame>` - Validated frame
///
/// # Errors
///
/// Returns error if:
/// - Header or body checksum fails (`ChecksumMismatch`)
/// - The slice length disagrees with the body length field (`MalformedFrame`)
///
/// # Examples
///
/// ```
/// use ipb_bus::ipb::decoder::decode_frame;
/// use ipb_bus::ipb::encoder::{encode_frame, FrameFormat};
/// use ipb_bus::ipb::protocol::MessageType;
///
/// let bytes = encode_frame(MessageType::Publish, &[0xF3, 0x01, 0x01, 0x05]).unwrap();
/// let frame = decode_frame(&FrameFormat::default(), &bytes).unwrap();
/// assert_eq!(frame.kind(), Some(MessageType::Publish));
/// assert_eq!(frame.payload, vec![0xF3, 0x01, 0x01, 0x05]);
/// ```
pub fn decode_frame(format: &FrameFormat, bytes: &[u8]) -> Result<Frame> {
    if bytes.len() < IPB_HEADER_SIZE {
        return Err(IpbError::MalformedFrame(format!(
            "frame too short: {} bytes",
            bytes.len()
        )));
    }

    let mut header_bytes = [0u8; IPB_HEADER_SIZE];
    header_bytes.copy_from_slice(&bytes[..IPB_HEADER_SIZE]);
    let header = validate_header(&header_bytes)?;

    let body_size = format.body_read_size(header.body_length).ok_or_else(|| {
        IpbError::MalformedFrame(format!("body length {} too small", header.body_length))
    })?;

    let body = &bytes[IPB_HEADER_SIZE..];
    if body.len() != body_size {
        return Err(IpbError::MalformedFrame(format!(
            "expected {} body bytes, got {}",
            body_size,
            body.len()
        )));
    }

    validate_body(header, body)
}

/// Incremental frame reader over a [`Transport`]
///
/// Bytes are pulled from the transport in exactly the amounts the framing
/// needs and kept in an internal buffer until a frame is consumed or the
/// reader resynchronizes. A cancelled `read_frame` future therefore loses
/// no bytes; the next call resumes from the buffered prefix.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    format: FrameFormat,
}

impl FrameReader {
    /// Create a reader for the given frame format
    pub fn new(format: FrameFormat) -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE),
            format,
        }
    }

    /// Bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Read the next frame from the transport
    ///
    /// # Returns
    ///
    /// * `Ok(Some(frame))` - A frame whose header and body validated
    /// * `Ok(None)` - Idle-line sentinel seen; leading sentinel bytes dropped
    ///
    /// # Errors
    ///
    /// - `ChecksumMismatch` / `MalformedFrame`: buffered bytes and the
    ///   transport input buffer were discarded; call again to resync
    /// - `Transport`: the transport failed or reached end of stream
    pub async fn read_frame<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Option<Frame>> {
        self.fill_to(transport, IPB_SYNC_PROBE_SIZE).await?;

        if self.buf[0] == IPB_RESYNC_SENTINEL {
            let idle = self
                .buf
                .iter()
                .take_while(|&&byte| byte == IPB_RESYNC_SENTINEL)
                .count();
            self.buf.advance(idle);
            trace!("Dropped {} idle sentinel bytes", idle);
            return Ok(None);
        }

        self.fill_to(transport, IPB_HEADER_SIZE).await?;

        let mut header_bytes = [0u8; IPB_HEADER_SIZE];
        header_bytes.copy_from_slice(&self.buf[..IPB_HEADER_SIZE]);
        let header = match validate_header(&header_bytes) {
            Ok(header) => header,
            Err(e) => {
                trace!("Rejected header {:02X?}", header_bytes);
                self.discard(transport)?;
                return Err(e);
            }
        };

        let Some(body_size) = self.format.body_read_size(header.body_length) else {
            self.discard(transport)?;
            return Err(IpbError::MalformedFrame(format!(
                "body length {} too small",
                header.body_length
            )));
        };

        let frame_size = IPB_HEADER_SIZE + body_size;
        self.fill_to(transport, frame_size).await?;

        match validate_body(header, &self.buf[IPB_HEADER_SIZE..frame_size]) {
            Ok(frame) => {
                self.buf.advance(frame_size);
                Ok(Some(frame))
            }
            Err(e) => {
                self.discard(transport)?;
                Err(e)
            }
        }
    }

    /// Read from the transport until `len` bytes are buffered
    async fn fill_to<T: Transport + ?Sized>(&mut self, transport: &mut T, len: usize) -> Result<()> {
        let mut chunk = [0u8; MAX_FRAME_SIZE];

        while self.buf.len() < len {
            let wanted = len - self.buf.len();
            let read = transport.read(&mut chunk[..wanted]).await?;
            if read == 0 {
                return Err(IpbError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "transport closed mid-frame",
                )));
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }

        Ok(())
    }

    /// Drop everything buffered here and in the transport
    fn discard<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<()> {
        self.buf.clear();
        transport.reset_input_buffer()?;
        Ok(())
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(FrameFormat::default())
    }
}
