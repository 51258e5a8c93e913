//! # ERD Field Decoder
//!
//! Renders the data bytes of a received message into named, typed values
//! using the field layout from the ERD dictionary.
//!
//! Resource-addressed payloads are laid out as:
//!
//! ```text
//! [erd_hi][erd_lo][data_len][data ...]
//! ```
//!
//! Field offsets count from the first data byte.

use std::fmt;
use tracing::debug;

use super::library::ErdLookup;
use super::schema::*;
use crate::error::{IpbError, Result};
use crate::ipb::protocol::MessageType;

/// Offset of the first data byte within a resource-addressed payload
pub const ERD_DATA_OFFSET: usize = 3;

/// Rendered value of one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Characters, one per byte
    Text(String),
    /// Boolean flag byte
    Bool(bool),
    /// Enumerated value; `label` is `None` when the dictionary has no entry
    Enum { value: u64, label: Option<String> },
    /// Lowercase hex digits
    Raw(String),
    /// Unsigned number
    Unsigned(u64),
    /// A set bit flag; the field name is the flag
    Flag,
}

/// A field name with its rendered value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedField {
    pub name: String,
    pub value: FieldValue,
}

impl fmt::Display for DecodedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Bool(value) => write!(f, "{}: {}", self.name, value),
            FieldValue::Enum { label: Some(label), .. } => write!(f, "{}: {}", self.name, label),
            FieldValue::Enum { value, label: None } => write!(f, "{}: {}", self.name, value),
            FieldValue::Raw(hex) => write!(f, "{}: {}", self.name, hex),
            FieldValue::Unsigned(value) => write!(f, "{}: {}", self.name, value),
            FieldValue::Flag => f.write_str(&self.name),
        }
    }
}

/// A decoded IPB message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Message type
    pub message_type: MessageType,

    /// Addressed resource, absent for non-resource messages
    pub erd: Option<ErdId>,

    /// Resource name from the dictionary
    pub name: Option<String>,

    /// Rendered fields in declared order
    pub fields: Vec<DecodedField>,
}

impl fmt::Display for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.message_type)?;

        if let Some(name) = &self.name {
            write!(f, " {}", name)?;
        }

        for (index, field) in self.fields.iter().enumerate() {
            let separator = if index == 0 { " - " } else { ". " };
            write!(f, "{}{}", separator, field)?;
        }

        Ok(())
    }
}

/// Decode a validated frame body into display fields
///
/// # Arguments
///
/// * `message_type` - Raw message type byte
/// * `payload` - Bytes following the message type
/// * `erds` - ERD dictionary
///
/// # Returns
///
/// * `Ok(None)` - Unknown message type; nothing to decode
/// * `Ok(Some(message))` - Decoded message
///
/// # Errors
///
/// - `SchemaNotFound` if the addressed ERD is not in the dictionary
/// - `PayloadTooShort` if the data bytes do not cover a field
/// - `UnsupportedField` for numeric fields wider than 8 bytes
pub fn decode_message<L: ErdLookup + ?Sized>(
    message_type: u8,
    payload: &[u8],
    erds: &L,
) -> Result<Option<DecodedMessage>> {
    let Some(kind) = MessageType::from_byte(message_type) else {
        return Ok(None);
    };

    let bare = DecodedMessage {
        message_type: kind,
        erd: None,
        name: None,
        fields: Vec::new(),
    };

    // Safety key content is not resource addressed; start/pause may be bare
    if kind == MessageType::SafetyKey
        || (kind == MessageType::StartPauseRequest && payload.is_empty())
    {
        return Ok(Some(bare));
    }

    let id = ErdId::from_payload(payload).ok_or_else(|| IpbError::PayloadTooShort {
        field: "ERD id".to_string(),
        needed: 2,
        available: payload.len(),
    })?;
    let erd = erds.lookup(id).ok_or(IpbError::SchemaNotFound(id))?;

    let mut message = DecodedMessage {
        erd: Some(id),
        name: Some(erd.name.clone()),
        ..bare
    };

    // Read requests carry no data
    if kind == MessageType::ReadRequest {
        return Ok(Some(message));
    }

    let data = erd_data(payload)?;
    for field in &erd.fields {
        if let Some(decoded) = decode_field(field, data)? {
            message.fields.push(decoded);
        }
    }

    Ok(Some(message))
}

/// Data bytes of a resource-addressed payload, bounded by its `data_len` byte
///
/// A payload that stops right after the id has no data. Bytes beyond the
/// declared length are ignored.
fn erd_data(payload: &[u8]) -> Result<&[u8]> {
    let Some(&declared) = payload.get(ERD_DATA_OFFSET - 1) else {
        return Ok(&[]);
    };
    let declared = declared as usize;
    let data = &payload[ERD_DATA_OFFSET..];

    if data.len() < declared {
        return Err(IpbError::PayloadTooShort {
            field: "ERD data".to_string(),
            needed: declared,
            available: data.len(),
        });
    }
    if data.len() > declared {
        debug!(
            "Ignoring {} bytes past the declared ERD data length {}",
            data.len() - declared,
            declared
        );
    }

    Ok(&data[..declared])
}

/// Render one field; `Ok(None)` when the field produces no output
pub fn decode_field(field: &FieldDescriptor, data: &[u8]) -> Result<Option<DecodedField>> {
    let value = match &field.kind {
        FieldKind::Bits { bit_offset, bit_size } => {
            // Multi-bit and multi-byte bit fields are reserved padding
            if *bit_size > 1 || field.size != 1 {
                return Ok(None);
            }
            let byte = field_bytes(field, data)?[0];
            if !bit_is_set(byte, *bit_offset) {
                return Ok(None);
            }
            FieldValue::Flag
        }
        FieldKind::String => {
            FieldValue::Text(field_bytes(field, data)?.iter().map(|&b| b as char).collect())
        }
        FieldKind::Bool => {
            let byte = *data.get(field.offset).ok_or_else(|| too_short(field, field.offset + 1, data))?;
            FieldValue::Bool(byte != 0)
        }
        FieldKind::Enum(values) => {
            let value = read_be(field, field_bytes(field, data)?)?;
            let label = values.get(&value.to_string()).cloned();
            FieldValue::Enum { value, label }
        }
        FieldKind::Raw => FieldValue::Raw(
            field_bytes(field, data)?
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect(),
        ),
        FieldKind::UnsignedInt(_) => FieldValue::Unsigned(read_be(field, field_bytes(field, data)?)?),
    };

    Ok(Some(DecodedField {
        name: field.name.clone(),
        value,
    }))
}

/// Expand a byte LSB-first and test the bit at `offset`
fn bit_is_set(byte: u8, offset: u8) -> bool {
    offset < 8 && (byte >> offset) & 1 == 1
}

fn field_bytes<'a>(field: &FieldDescriptor, data: &'a [u8]) -> Result<&'a [u8]> {
    data.get(field.offset..field.end())
        .ok_or_else(|| too_short(field, field.end(), data))
}

fn too_short(field: &FieldDescriptor, needed: usize, data: &[u8]) -> IpbError {
    IpbError::PayloadTooShort {
        field: field.name.clone(),
        needed,
        available: data.len(),
    }
}

fn read_be(field: &FieldDescriptor, bytes: &[u8]) -> Result<u64> {
    if bytes.len() > 8 {
        return Err(IpbError::UnsupportedField(format!(
            "'{}' is {} bytes wide, numeric fields hold at most 8",
            field.name,
            bytes.len()
        )));
    }

    Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erd::library::{ErdLibrary, MockErdLookup};
    use std::collections::HashMap;

    fn field(name: &str, offset: usize, size: usize, kind: FieldKind) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            offset,
            size,
            kind,
        }
    }

    fn status_values() -> HashMap<String, String> {
        [("0", "Idle"), ("5", "Running"), ("261", "Drying")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn library() -> ErdLibrary {
        let mut library = ErdLibrary::new();
        library.insert(ErdDefinition {
            id: ErdId(0xF301),
            name: "Machine Status".to_string(),
            fields: vec![
                field("Status", 0, 1, FieldKind::Enum(status_values())),
                field("Door Open", 1, 1, FieldKind::Bits { bit_offset: 1, bit_size: 1 }),
                field("Reserved", 1, 1, FieldKind::Bits { bit_offset: 2, bit_size: 6 }),
                field("Locked", 2, 1, FieldKind::Bool),
                field("Remaining", 3, 2, FieldKind::UnsignedInt(IntWidth::U16)),
            ],
        });
        library.insert(ErdDefinition {
            id: ErdId(0xF0A0),
            name: "Model".to_string(),
            fields: vec![
                field("Model", 0, 4, FieldKind::String),
                field("Serial", 4, 3, FieldKind::Raw),
            ],
        });
        library
    }

    #[test]
    fn test_decode_publish_fields_in_order() {
        let payload = [0xF3, 0x01, 0x05, 0x05, 0b0000_0010, 0x01, 0x01, 0x2C];
        let message = decode_message(0x22, &payload, &library()).unwrap().unwrap();

        assert_eq!(message.message_type, MessageType::Publish);
        assert_eq!(message.erd, Some(ErdId(0xF301)));
        assert_eq!(message.name.as_deref(), Some("Machine Status"));

        let rendered: Vec<String> = message.fields.iter().map(|f| f.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["Status: Running", "Door Open", "Locked: true", "Remaining: 300"]
        );
        assert_eq!(
            message.to_string(),
            "[Publish] Machine Status - Status: Running. Door Open. Locked: true. Remaining: 300"
        );
    }

    #[test]
    fn test_enum_falls_back_to_number() {
        let f = field("Status", 0, 1, FieldKind::Enum(status_values()));
        let decoded = decode_field(&f, &[42]).unwrap().unwrap();

        assert_eq!(decoded.value, FieldValue::Enum { value: 42, label: None });
        assert_eq!(decoded.to_string(), "Status: 42");
    }

    #[test]
    fn test_enum_reads_big_endian() {
        let f = field("Status", 0, 2, FieldKind::Enum(status_values()));
        let decoded = decode_field(&f, &[0x01, 0x05]).unwrap().unwrap();
        assert_eq!(decoded.to_string(), "Status: Drying");
    }

    #[test]
    fn test_bits_lsb_first() {
        let set = field("Door Open", 0, 1, FieldKind::Bits { bit_offset: 1, bit_size: 1 });
        let clear = field("Heater On", 0, 1, FieldKind::Bits { bit_offset: 5, bit_size: 1 });

        let decoded = decode_field(&set, &[0b0000_0010]).unwrap().unwrap();
        assert_eq!(decoded.value, FieldValue::Flag);
        assert_eq!(decoded.to_string(), "Door Open");

        assert_eq!(decode_field(&clear, &[0b0000_0010]).unwrap(), None);
    }

    #[test]
    fn test_multi_byte_bits_are_reserved() {
        let reserved = field("Spare", 0, 2, FieldKind::Bits { bit_offset: 0, bit_size: 1 });
        assert_eq!(decode_field(&reserved, &[0xFF, 0xFF]).unwrap(), None);

        // Reserved padding never touches the data
        assert_eq!(decode_field(&reserved, &[]).unwrap(), None);
    }

    #[test]
    fn test_bool_zero_and_nonzero() {
        let f = field("Locked", 0, 1, FieldKind::Bool);
        assert_eq!(decode_field(&f, &[0]).unwrap().unwrap().to_string(), "Locked: false");
        assert_eq!(decode_field(&f, &[7]).unwrap().unwrap().to_string(), "Locked: true");
    }

    #[test]
    fn test_string_and_raw() {
        let payload = [0xF0, 0xA0, 0x07, b'D', b'E', b'9', b'0', 0x0A, 0x00, 0xFF];
        let message = decode_message(0x22, &payload, &library()).unwrap().unwrap();

        assert_eq!(message.fields[0].value, FieldValue::Text("DE90".to_string()));
        assert_eq!(message.fields[1].value, FieldValue::Raw("0a00ff".to_string()));
        assert_eq!(message.fields[1].to_string(), "Serial: 0a00ff");
    }

    #[test]
    fn test_unsigned_widths() {
        let u8_field = field("Level", 0, 1, FieldKind::UnsignedInt(IntWidth::U8));
        let u32_field = field("Runtime", 1, 4, FieldKind::UnsignedInt(IntWidth::U32));
        let data = [0xFF, 0x00, 0x01, 0x00, 0x00];

        assert_eq!(decode_field(&u8_field, &data).unwrap().unwrap().value, FieldValue::Unsigned(255));
        assert_eq!(
            decode_field(&u32_field, &data).unwrap().unwrap().value,
            FieldValue::Unsigned(65_536)
        );
    }

    #[test]
    fn test_numeric_field_too_wide() {
        let f = field("Huge", 0, 9, FieldKind::UnsignedInt(IntWidth::U32));
        assert!(matches!(
            decode_field(&f, &[0u8; 9]),
            Err(IpbError::UnsupportedField(_))
        ));
    }

    #[test]
    fn test_undersized_payload_is_reported() {
        let payload = [0xF3, 0x01, 0x02, 0x05, 0x00];
        let result = decode_message(0x22, &payload, &library());

        match result {
            Err(IpbError::PayloadTooShort { field, needed, available }) => {
                assert_eq!(field, "Locked");
                assert_eq!(needed, 3);
                assert_eq!(available, 2);
            }
            other => panic!("Expected PayloadTooShort, got: {:?}", other),
        }
    }

    #[test]
    fn test_read_request_yields_name_only() {
        let message = decode_message(0x27, &[0xF3, 0x01], &library()).unwrap().unwrap();

        assert_eq!(message.name.as_deref(), Some("Machine Status"));
        assert!(message.fields.is_empty());
        assert_eq!(message.to_string(), "[Read Request] Machine Status");
    }

    #[test]
    fn test_safety_key_skips_lookup() {
        let mut erds = MockErdLookup::new();
        erds.expect_lookup().never();

        let message = decode_message(0x24, &[0xF3, 0x01, 0xAA], &erds).unwrap().unwrap();
        assert_eq!(message.message_type, MessageType::SafetyKey);
        assert_eq!(message.erd, None);
        assert!(message.fields.is_empty());
    }

    #[test]
    fn test_bare_start_pause_request() {
        let mut erds = MockErdLookup::new();
        erds.expect_lookup().never();

        let message = decode_message(0x23, &[], &erds).unwrap().unwrap();
        assert_eq!(message.to_string(), "[Start/Pause Request]");
    }

    #[test]
    fn test_unknown_message_type_is_skipped() {
        let mut erds = MockErdLookup::new();
        erds.expect_lookup().never();

        assert_eq!(decode_message(0x42, &[0xF3, 0x01], &erds).unwrap(), None);
    }

    #[test]
    fn test_schema_not_found() {
        let mut erds = MockErdLookup::new();
        erds.expect_lookup()
            .withf(|id| *id == ErdId(0xBEEF))
            .times(1)
            .returning(|_| None);

        let result = decode_message(0x22, &[0xBE, 0xEF, 0x01, 0x00], &erds);
        assert!(matches!(result, Err(IpbError::SchemaNotFound(ErdId(0xBEEF)))));
    }

    #[test]
    fn test_data_bounded_by_declared_length() {
        let f = FieldDescriptor {
            name: "Level".to_string(),
            offset: 0,
            size: 1,
            kind: FieldKind::UnsignedInt(IntWidth::U8),
        };
        let mut erds = ErdLibrary::new();
        erds.insert(ErdDefinition {
            id: ErdId(0xF42B),
            name: "2D Moisture Level".to_string(),
            fields: vec![f.clone(), FieldDescriptor { name: "Spare".to_string(), offset: 1, ..f }],
        });

        let result = decode_message(0x22, &[0xF4, 0x2B, 0x01, 0x03, 0x09], &erds);
        match result {
            Err(IpbError::PayloadTooShort { field, needed, available }) => {
                assert_eq!(field, "Spare");
                assert_eq!(needed, 2);
                assert_eq!(available, 1);
            }
            other => panic!("Expected PayloadTooShort, got: {:?}", other),
        }
    }

    #[test]
    fn test_trailing_bytes_past_declared_length_are_ignored() {
        let payload = [0xF3, 0x01, 0x05, 0x05, 0b0000_0010, 0x01, 0x01, 0x2C, 0xEE, 0xEE];
        let message = decode_message(0x22, &payload, &library()).unwrap().unwrap();
        assert_eq!(message.fields.len(), 4);
    }

    #[test]
    fn test_declared_length_beyond_payload() {
        let result = decode_message(0x22, &[0xF3, 0x01, 0x06, 0x05, 0x00], &library());
        match result {
            Err(IpbError::PayloadTooShort { field, needed, available }) => {
                assert_eq!(field, "ERD data");
                assert_eq!(needed, 6);
                assert_eq!(available, 2);
            }
            other => panic!("Expected PayloadTooShort, got: {:?}", other),
        }
    }

    #[test]
    fn test_payload_without_erd_id() {
        let result = decode_message(0x22, &[0xF3], &library());
        assert!(matches!(result, Err(IpbError::PayloadTooShort { needed: 2, .. })));
    }
}
