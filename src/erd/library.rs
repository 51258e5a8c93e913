//! # ERD Dictionary
//!
//! Lookup contract for ERD definitions plus an in-memory dictionary that
//! can be loaded from the JSON export used by the bench tooling.
//!
//! ```json
//! [
//!   {
//!     "id": "0xF012",
//!     "name": "Cap Touch Command",
//!     "data": [
//!       { "name": "Command", "type": "enum", "offset": 0, "size": 1,
//!         "values": { "1": "Power Key Press", "11": "Dryer Start/Pause" } },
//!       { "name": "Key Count", "type": "u8", "offset": 1, "size": 1 }
//!     ]
//!   }
//! ]
//! ```
//!
//! A field carrying `"bits": { "offset": n, "size": m }` is a bit flag.

use serde::de::Error as _;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::schema::*;
use crate::error::{IpbError, Result};

/// Read-only access to ERD definitions
#[cfg_attr(test, mockall::automock)]
pub trait ErdLookup: Send + Sync {
    /// Definition registered for `id`, if any
    fn lookup(&self, id: ErdId) -> Option<Arc<ErdDefinition>>;
}

/// In-memory ERD dictionary
#[derive(Debug, Clone, Default)]
pub struct ErdLibrary {
    erds: HashMap<ErdId, Arc<ErdDefinition>>,
}

#[derive(Debug, Deserialize)]
struct RawErd {
    id: String,
    name: String,
    #[serde(default)]
    data: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    offset: usize,
    size: usize,
    #[serde(default)]
    values: HashMap<String, String>,
    #[serde(default)]
    bits: Option<RawBits>,
}

#[derive(Debug, Deserialize)]
struct RawBits {
    offset: u8,
    size: u8,
}

impl ErdLibrary {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a dictionary from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or
    /// declares a field type the decoder does not know.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ipb_bus::erd::library::ErdLibrary;
    ///
    /// let erds = ErdLibrary::load("config/erd_library.json")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parse a dictionary from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: Vec<RawErd> = serde_json::from_str(json)?;
        let mut library = Self::new();

        for erd in raw {
            let definition = convert_erd(erd)?;
            library.insert(definition);
        }

        debug!("Loaded {} ERD definitions", library.len());
        Ok(library)
    }

    /// Register a definition, replacing any previous one with the same id
    pub fn insert(&mut self, definition: ErdDefinition) {
        self.erds.insert(definition.id, Arc::new(definition));
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.erds.len()
    }

    /// Whether the dictionary is empty
    pub fn is_empty(&self) -> bool {
        self.erds.is_empty()
    }
}

impl ErdLookup for ErdLibrary {
    fn lookup(&self, id: ErdId) -> Option<Arc<ErdDefinition>> {
        self.erds.get(&id).cloned()
    }
}

fn convert_erd(raw: RawErd) -> Result<ErdDefinition> {
    let id = raw.id.parse::<ErdId>().map_err(|e| {
        IpbError::Dictionary(serde_json::Error::custom(format!(
            "invalid ERD id '{}': {}",
            raw.id, e
        )))
    })?;

    let fields = raw
        .data
        .into_iter()
        .map(|field| convert_field(id, field))
        .collect::<Result<Vec<_>>>()?;

    Ok(ErdDefinition {
        id,
        name: raw.name,
        fields,
    })
}

fn convert_field(id: ErdId, raw: RawField) -> Result<FieldDescriptor> {
    let kind = if let Some(bits) = raw.bits {
        FieldKind::Bits {
            bit_offset: bits.offset,
            bit_size: bits.size,
        }
    } else {
        match raw.kind.as_deref() {
            Some("string") => FieldKind::String,
            Some("bool") => FieldKind::Bool,
            Some("enum") => FieldKind::Enum(raw.values),
            Some("raw") => FieldKind::Raw,
            Some("u8") => FieldKind::UnsignedInt(IntWidth::U8),
            Some("u16") => FieldKind::UnsignedInt(IntWidth::U16),
            Some("u32") => FieldKind::UnsignedInt(IntWidth::U32),
            other => {
                return Err(IpbError::UnsupportedField(format!(
                    "ERD {} field '{}' has type {:?}",
                    id, raw.name, other
                )))
            }
        }
    };

    if let FieldKind::UnsignedInt(width) = kind {
        if raw.size != width.bytes() {
            return Err(IpbError::UnsupportedField(format!(
                "ERD {} field '{}' declares {} bytes for a {}-byte integer",
                id,
                raw.name,
                raw.size,
                width.bytes()
            )));
        }
    }

    Ok(FieldDescriptor {
        name: raw.name,
        offset: raw.offset,
        size: raw.size,
        kind,
    })
}
