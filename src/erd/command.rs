//! # ERD Command Encoder
//!
//! Builds validated command frames for an ERD: the requested value is
//! checked against the ERD's primary field before any bytes are produced.
//!
//! ```text
//! payload = [erd_hi][erd_lo][data_len][value ...][key_count]?
//! ```

use std::sync::Arc;
use tracing::debug;

use super::library::ErdLookup;
use super::schema::*;
use crate::bus::state::ConnectionState;
use crate::error::{IpbError, Result};
use crate::ipb::encoder::FrameEncoder;
use crate::ipb::protocol::MessageType;

/// How a command value is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStyle {
    /// Cap-touch key press: published with a trailing key count byte
    KeyPress,
    /// Published value without key count
    Publish,
    /// Configuration write
    Write,
}

impl CommandStyle {
    /// Message type carrying this style
    pub fn message_type(self) -> MessageType {
        match self {
            CommandStyle::KeyPress | CommandStyle::Publish => MessageType::Publish,
            CommandStyle::Write => MessageType::WriteRequest,
        }
    }
}

/// Encodes ERD commands into complete frames
pub struct CommandEncoder {
    erds: Arc<dyn ErdLookup>,
    frames: FrameEncoder,
}

impl std::fmt::Debug for CommandEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEncoder")
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl CommandEncoder {
    /// Create an encoder over a dictionary and frame encoder
    pub fn new(erds: Arc<dyn ErdLookup>, frames: FrameEncoder) -> Self {
        Self { erds, frames }
    }

    /// Frame encoder in use
    pub fn frames(&self) -> &FrameEncoder {
        &self.frames
    }

    /// Build a command frame writing `value` to `erd`
    ///
    /// # Arguments
    ///
    /// * `erd` - Target resource
    /// * `value` - Decimal value, e.g. `"11"` for dryer start/pause, sent as
    ///   the number 11 (`0x0B`)
    /// * `style` - Delivery style
    /// * `state` - Connection state; its key count is consumed by key presses
    ///
    /// # Errors
    ///
    /// - `SchemaNotFound` if the ERD is not in the dictionary
    /// - `InvalidCommandValue` if the value is not allowed for the primary field
    /// - `UnsupportedField` if the ERD has no usable primary field
    ///
    /// No key count is consumed when an error is returned.
    pub fn build_command(
        &mut self,
        erd: ErdId,
        value: &str,
        style: CommandStyle,
        state: &mut ConnectionState,
    ) -> Result<Vec<u8>> {
        let definition = self.erds.lookup(erd).ok_or(IpbError::SchemaNotFound(erd))?;
        let field = definition.primary_field().ok_or_else(|| {
            IpbError::UnsupportedField(format!("ERD {} has no data field", erd))
        })?;

        let value_bytes = encode_value(erd, field, value)?;

        let mut payload = Vec::with_capacity(3 + value_bytes.len() + 1);
        payload.extend_from_slice(&erd.to_bytes());
        let data_len = value_bytes.len() + usize::from(style == CommandStyle::KeyPress);
        payload.push(data_len as u8);
        payload.extend_from_slice(&value_bytes);
        if style == CommandStyle::KeyPress {
            payload.push(state.key_count());
        }

        let frame = self.frames.encode(style.message_type(), &payload)?;
        if style == CommandStyle::KeyPress {
            state.take_key_count();
        }

        debug!("Built {:?} command {}={} ({} bytes)", style, erd, value, frame.len());
        Ok(frame)
    }

    /// Build a read request for `erd`; the payload is the id alone
    pub fn build_read_request(&mut self, erd: ErdId) -> Result<Vec<u8>> {
        self.frames.encode(MessageType::ReadRequest, &erd.to_bytes())
    }

    /// Build a bare start/pause request
    pub fn build_start_pause_request(&mut self) -> Result<Vec<u8>> {
        self.frames.encode(MessageType::StartPauseRequest, &[])
    }
}

/// Validate `value` against `field` and encode it big-endian in the field's size
fn encode_value(erd: ErdId, field: &FieldDescriptor, value: &str) -> Result<Vec<u8>> {
    let invalid = || IpbError::InvalidCommandValue {
        erd,
        value: value.to_string(),
    };

    if field.size == 0 || field.size > 8 {
        return Err(IpbError::UnsupportedField(format!(
            "ERD {} field '{}' is {} bytes wide",
            erd, field.name, field.size
        )));
    }

    if let Some(allowed) = field.allowed_values() {
        if !allowed.contains(&value) {
            return Err(invalid());
        }
    }

    let number: u64 = value.parse().map_err(|_| invalid())?;
    let bytes = number.to_be_bytes();
    let (high, low) = bytes.split_at(bytes.len() - field.size);
    if high.iter().any(|&b| b != 0) {
        return Err(invalid());
    }

    Ok(low.to_vec())
}
