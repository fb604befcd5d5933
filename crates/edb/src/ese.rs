//! The narrow capability interface any ESE parser backend implements.
//!
//! Page and B-tree traversal of the ESE file itself is delegated to the
//! embedding application; this engine only needs table enumeration, raw
//! column bytes with a long-value flag, and long-value resolution by LV-ID.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use serde::Deserialize;

use crate::error::{EdbError, ErrorContext, Result};
use crate::time;

/// ESE file signature at byte offset 4.
pub const ESE_SIGNATURE: [u8; 4] = [0xEF, 0xCD, 0xAB, 0x89];

/// A raw column value: either inline bytes or the 4-byte LV-ID of a long
/// value.
#[derive(Clone, Debug)]
pub struct ColumnBytes {
    pub bytes: Vec<u8>,
    pub is_long_value: bool,
}

/// One table row.
pub trait EseRow {
    fn raw(&self, column: &str) -> Option<ColumnBytes>;
}

/// One table.
pub trait EseTable {
    fn column_names(&self) -> Vec<String>;
    fn row_count(&self) -> usize;
    fn row(&self, index: usize) -> Option<Box<dyn EseRow + '_>>;
    /// Resolve a long value by its 4-byte LV-ID.
    fn long_value(&self, lv_id: u32) -> Option<Vec<u8>>;
}

/// An open database.
pub trait EseDatabase {
    fn table_names(&self) -> Vec<String>;
    fn table(&self, name: &str) -> Option<&dyn EseTable>;
}

/// Validate that a file exists and carries the ESE signature.
pub fn check_ese_file(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Err(EdbError::InputNotFound(path.to_path_buf()));
    }
    let metadata = fs::metadata(path)?;
    let mut header = [0_u8; 8];
    {
        use std::io::Read;
        let mut file = fs::File::open(path)?;
        if file.read_exact(&mut header).is_err() {
            return Err(EdbError::MalformedDatabase {
                path: path.to_path_buf(),
                reason: "file too short for an ESE header".into(),
            });
        }
    }
    if header[4..8] != ESE_SIGNATURE {
        return Err(EdbError::MalformedDatabase {
            path: path.to_path_buf(),
            reason: "missing ESE signature".into(),
        });
    }
    Ok(metadata.len())
}

/// Normalizes raw row bytes behind typed accessors, resolving long values
/// through the owning table.
pub struct RowAdapter<'a> {
    table: &'a dyn EseTable,
    row: Box<dyn EseRow + 'a>,
    pub context: ErrorContext,
}

impl<'a> RowAdapter<'a> {
    pub fn new(
        table: &'a dyn EseTable,
        table_name: &str,
        index: usize,
    ) -> Option<Self> {
        let row = table.row(index)?;
        Some(Self {
            table,
            row,
            context: ErrorContext::row(table_name, index),
        })
    }

    /// Raw column value with long-value indirection applied.
    pub fn bytes(&self, column: &str) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.row.raw(column) else {
            return Ok(None);
        };
        if !raw.is_long_value {
            return Ok(Some(raw.bytes));
        }

        if raw.bytes.len() < 4 {
            return Err(EdbError::LongValueMissing {
                lv_id: 0,
                context: self.column_context(column),
            });
        }
        let lv_id = LittleEndian::read_u32(&raw.bytes);
        self.table
            .long_value(lv_id)
            .map(Some)
            .ok_or(EdbError::LongValueMissing {
                lv_id,
                context: self.column_context(column),
            })
    }

    fn column_context(&self, column: &str) -> ErrorContext {
        let mut context = self.context.clone();
        context.column = Some(column.to_string());
        context
    }

    /// Little-endian integer of 1, 2, 4 or 8 bytes.
    pub fn integer(&self, column: &str) -> Result<Option<u64>> {
        Ok(self.bytes(column)?.and_then(|bytes| match bytes.len() {
            1 => Some(bytes[0] as u64),
            2 => Some(LittleEndian::read_u16(&bytes) as u64),
            4 => Some(LittleEndian::read_u32(&bytes) as u64),
            8 => Some(LittleEndian::read_u64(&bytes)),
            _ => None,
        }))
    }

    /// Any non-zero byte sequence is true.
    pub fn boolean(&self, column: &str) -> Result<bool> {
        Ok(self
            .bytes(column)?
            .is_some_and(|bytes| bytes.iter().any(|&byte| byte != 0)))
    }

    pub fn filetime(&self, column: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        Ok(self
            .bytes(column)?
            .and_then(|bytes| time::from_filetime_bytes(&bytes)))
    }

    pub fn string(&self, column: &str) -> Result<Option<crate::strings::Decoded>> {
        Ok(self
            .bytes(column)?
            .map(|bytes| crate::strings::decode_exchange_string(&bytes)))
    }
}

// ---------------------------------------------------------------------------
// In-memory backend, also deserializable from a JSON table dump. Used by the
// integration tests and by embedders that feed pre-extracted tables.
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize, Debug)]
pub struct MemoryTable {
    #[serde(default)]
    pub columns: Vec<String>,
    /// Rows map column name to (hex bytes, long-value flag).
    #[serde(default)]
    pub rows: Vec<BTreeMap<String, MemoryValue>>,
    /// Long values by LV-ID, hex-encoded in the dump.
    #[serde(default, with = "hex_map")]
    pub long_values: BTreeMap<u32, Vec<u8>>,
}

#[derive(Clone, Deserialize, Debug)]
pub struct MemoryValue {
    #[serde(with = "hex_bytes")]
    pub hex: Vec<u8>,
    #[serde(default)]
    pub lv: bool,
}

#[derive(Default, Deserialize, Debug)]
pub struct MemoryDatabase {
    pub tables: BTreeMap<String, MemoryTable>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text).ok_or_else(|| serde::de::Error::custom("invalid hex"))
    }

    pub fn decode(text: &str) -> Option<Vec<u8>> {
        if text.len() % 2 != 0 {
            return None;
        }
        (0..text.len())
            .step_by(2)
            .map(|index| u8::from_str_radix(&text[index..index + 2], 16).ok())
            .collect()
    }
}

mod hex_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<u32, Vec<u8>>, D::Error> {
        let raw: BTreeMap<String, String> = BTreeMap::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| {
                let id = key
                    .parse::<u32>()
                    .map_err(|_| serde::de::Error::custom("invalid LV-ID"))?;
                let bytes = super::hex_bytes::decode(&value)
                    .ok_or_else(|| serde::de::Error::custom("invalid hex"))?;
                Ok((id, bytes))
            })
            .collect()
    }
}

impl MemoryDatabase {
    /// Load a JSON table dump produced by an external ESE parser.
    pub fn from_json(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|error| EdbError::MalformedDatabase {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })
    }
}

pub struct MemoryRow<'a> {
    row: &'a BTreeMap<String, MemoryValue>,
}

impl EseRow for MemoryRow<'_> {
    fn raw(&self, column: &str) -> Option<ColumnBytes> {
        self.row.get(column).map(|value| ColumnBytes {
            bytes: value.hex.clone(),
            is_long_value: value.lv,
        })
    }
}

impl EseTable for MemoryTable {
    fn column_names(&self) -> Vec<String> {
        if !self.columns.is_empty() {
            return self.columns.clone();
        }
        let mut names: Vec<String> = self
            .rows
            .iter()
            .flat_map(|row| row.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row(&self, index: usize) -> Option<Box<dyn EseRow + '_>> {
        let row = self.rows.get(index)?;
        Some(Box::new(MemoryRow { row }))
    }

    fn long_value(&self, lv_id: u32) -> Option<Vec<u8>> {
        self.long_values.get(&lv_id).cloned()
    }
}

impl EseDatabase for MemoryDatabase {
    fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    fn table(&self, name: &str) -> Option<&dyn EseTable> {
        self.tables.get(name).map(|table| table as &dyn EseTable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(bytes: &[u8]) -> MemoryValue {
        MemoryValue {
            hex: bytes.to_vec(),
            lv: false,
        }
    }

    fn sample_table() -> MemoryTable {
        let mut row = BTreeMap::new();
        row.insert("Size".to_string(), value(&1234_u32.to_le_bytes()));
        row.insert("IsRead".to_string(), value(&[1]));
        row.insert(
            "Body".to_string(),
            MemoryValue {
                hex: 77_u32.to_le_bytes().to_vec(),
                lv: true,
            },
        );
        let mut long_values = BTreeMap::new();
        long_values.insert(77_u32, b"resolved".to_vec());
        MemoryTable {
            columns: vec![],
            rows: vec![row],
            long_values,
        }
    }

    #[test]
    fn test_row_adapter_accessors() {
        let table = sample_table();
        let adapter = RowAdapter::new(&table, "Message_103", 0).unwrap();
        assert_eq!(adapter.integer("Size").unwrap(), Some(1234));
        assert!(adapter.boolean("IsRead").unwrap());
        assert!(!adapter.boolean("Missing").unwrap());
        assert_eq!(adapter.bytes("Body").unwrap().unwrap(), b"resolved");
    }

    #[test]
    fn test_missing_long_value_is_reported() {
        let mut table = sample_table();
        table.long_values.clear();
        let adapter = RowAdapter::new(&table, "Message_103", 0).unwrap();
        assert!(matches!(
            adapter.bytes("Body"),
            Err(EdbError::LongValueMissing { lv_id: 77, .. })
        ));
    }

    #[test]
    fn test_json_dump_round_trip() {
        let json = r#"{
            "tables": {
                "Mailbox": {
                    "rows": [{"MailboxNumber": {"hex": "67000000"}}],
                    "long_values": {"5": "aabb"}
                }
            }
        }"#;
        let database: MemoryDatabase = serde_json::from_str(json).unwrap();
        let table = database.table("Mailbox").unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.long_value(5).unwrap(), vec![0xAA, 0xBB]);
        let adapter = RowAdapter::new(table, "Mailbox", 0).unwrap();
        assert_eq!(adapter.integer("MailboxNumber").unwrap(), Some(0x67));
    }
}
