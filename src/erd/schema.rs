//! # ERD Schema Types
//!
//! In-memory form of one Electronic Resource Descriptor: the id, the human
//! name and the ordered field layout used to render its data bytes.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 16-bit ERD identifier
///
/// Displayed as `0xF012`; parsed from `f012`, `F012` or `0xF012`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErdId(pub u16);

impl ErdId {
    /// Big-endian wire bytes
    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Read an id from the first two payload bytes
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [hi, lo, ..] => Some(Self(u16::from_be_bytes([*hi, *lo]))),
            _ => None,
        }
    }

    /// Lowercase hex form without prefix, as keyed by the dictionary tooling
    pub fn to_hex(self) -> String {
        format!("{:04x}", self.0)
    }
}

impl fmt::Display for ErdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl FromStr for ErdId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        u16::from_str_radix(digits, 16).map(ErdId)
    }
}

/// Declared width of an unsigned integer field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    U8,
    U16,
    U32,
}

impl IntWidth {
    /// Width in bytes
    pub fn bytes(self) -> usize {
        match self {
            IntWidth::U8 => 1,
            IntWidth::U16 => 2,
            IntWidth::U32 => 4,
        }
    }
}

/// How a field's bytes are rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// One character per byte
    String,
    /// Zero is false, anything else true
    Bool,
    /// Big-endian number looked up in a decimal-string keyed label map
    Enum(HashMap<String, String>),
    /// Lowercase hex, no separators
    Raw,
    /// Big-endian unsigned number
    UnsignedInt(IntWidth),
    /// Single flag inside a byte, LSB-first bit numbering
    Bits {
        /// Bit position within the byte
        bit_offset: u8,
        /// Declared bit-field size; anything above 1 is reserved padding
        bit_size: u8,
    },
}

/// Layout of one field within an ERD's data bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field (or flag) name
    pub name: String,

    /// Byte offset from the first data byte
    pub offset: usize,

    /// Size in bytes
    pub size: usize,

    /// Rendering
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Exclusive end of the field's byte range
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Values a command may write to this field, as decimal strings
    ///
    /// `None` means any number that fits the field is acceptable.
    pub fn allowed_values(&self) -> Option<Vec<&str>> {
        match &self.kind {
            FieldKind::Enum(values) => Some(values.keys().map(String::as_str).collect()),
            FieldKind::Bool => Some(vec!["0", "1"]),
            _ => None,
        }
    }
}

/// Schema for one addressable resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErdDefinition {
    /// Resource identifier
    pub id: ErdId,

    /// Human name
    pub name: String,

    /// Fields in declared order
    pub fields: Vec<FieldDescriptor>,
}

impl ErdDefinition {
    /// The field commands write to
    pub fn primary_field(&self) -> Option<&FieldDescriptor> {
        self.fields.first()
    }
}
