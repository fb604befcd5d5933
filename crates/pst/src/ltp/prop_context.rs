//! ## [Property Context (PC)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/294c83c6-ff92-42f5-b6b6-876c29fa9737)
//!
//! A PC is a BTree-on-Heap keyed by 16-bit property ID; each record carries
//! the property type and either an inline value, an HID into the heap, or a
//! sub-node NID for large values.

use std::{
    collections::BTreeMap,
    io::{self, Read, Seek, Write},
};

use super::{
    heap::{HeapClientSignature, HeapWriter, MAX_HEAP_ALLOC},
    tree::write_tree_on_heap,
    *,
};
use crate::ndb::{block::SubNodeEntry, writer::NdbWriter};

/// `PtypInteger16`
pub const PTYPE_INTEGER16: u16 = 0x0002;
/// `PtypInteger32`
pub const PTYPE_INTEGER32: u16 = 0x0003;
/// `PtypBoolean`
pub const PTYPE_BOOLEAN: u16 = 0x000B;
/// `PtypInteger64`
pub const PTYPE_INTEGER64: u16 = 0x0014;
/// `PtypString8`
pub const PTYPE_STRING8: u16 = 0x001E;
/// `PtypString`
pub const PTYPE_UNICODE: u16 = 0x001F;
/// `PtypTime`
pub const PTYPE_TIME: u16 = 0x0040;
/// `PtypGuid`
pub const PTYPE_GUID: u16 = 0x0048;
/// `PtypBinary`
pub const PTYPE_BINARY: u16 = 0x0102;

/// A property value the writer can serialize.
#[derive(Clone, Debug)]
pub enum PropertyValue {
    Integer16(i16),
    Integer32(i32),
    Boolean(bool),
    Integer64(i64),
    /// FILETIME: 100-nanosecond ticks since 1601-01-01 UTC.
    Time(i64),
    Guid([u8; 16]),
    /// Multibyte string in an externally specified encoding.
    String8(Vec<u8>),
    /// Stored as UTF-16LE with no BOM and no terminator.
    Unicode(String),
    Binary(Vec<u8>),
}

impl PropertyValue {
    pub fn prop_type(&self) -> u16 {
        match self {
            PropertyValue::Integer16(_) => PTYPE_INTEGER16,
            PropertyValue::Integer32(_) => PTYPE_INTEGER32,
            PropertyValue::Boolean(_) => PTYPE_BOOLEAN,
            PropertyValue::Integer64(_) => PTYPE_INTEGER64,
            PropertyValue::Time(_) => PTYPE_TIME,
            PropertyValue::Guid(_) => PTYPE_GUID,
            PropertyValue::String8(_) => PTYPE_STRING8,
            PropertyValue::Unicode(_) => PTYPE_UNICODE,
            PropertyValue::Binary(_) => PTYPE_BINARY,
        }
    }

    /// The value bytes for heap or sub-node placement; `None` for values that
    /// fit the 4-byte inline slot.
    pub(crate) fn variable_bytes(&self) -> Option<Vec<u8>> {
        match self {
            PropertyValue::Integer16(_)
            | PropertyValue::Integer32(_)
            | PropertyValue::Boolean(_) => None,
            PropertyValue::Integer64(value) | PropertyValue::Time(value) => {
                Some(value.to_le_bytes().to_vec())
            }
            PropertyValue::Guid(value) => Some(value.to_vec()),
            PropertyValue::String8(value) | PropertyValue::Binary(value) => Some(value.clone()),
            PropertyValue::Unicode(value) => Some(utf16le_bytes(value)),
        }
    }

    fn inline_value(&self) -> Option<u32> {
        match self {
            PropertyValue::Integer16(value) => Some(*value as i32 as u32),
            PropertyValue::Integer32(value) => Some(*value as u32),
            PropertyValue::Boolean(value) => Some(u32::from(*value)),
            _ => None,
        }
    }
}

/// Encode a string as UTF-16LE with no BOM.
pub fn utf16le_bytes(value: &str) -> Vec<u8> {
    value
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

/// Resolve a value into its `dwValueHnid`: inline, heap HID, or sub-node NID
/// for values past the heap allocation limit.
pub(crate) fn value_hnid<F>(
    value: &PropertyValue,
    heap: &mut HeapWriter,
    ndb: &mut NdbWriter<F>,
    nodes: &mut LtpNodeAllocator,
    subnodes: &mut Vec<SubNodeEntry>,
) -> io::Result<u32>
where
    F: Read + Write + Seek,
{
    if let Some(inline) = value.inline_value() {
        return Ok(inline);
    }

    let Some(bytes) = value.variable_bytes() else {
        return Ok(0);
    };
    if bytes.is_empty() {
        return Ok(0);
    }

    if bytes.len() <= MAX_HEAP_ALLOC {
        return Ok(u32::from(heap.allocate(&bytes)?));
    }

    let nid = nodes.allocate()?;
    let data = ndb.write_data(&bytes)?;
    subnodes.push(SubNodeEntry {
        nid,
        data,
        sub: crate::ndb::block_id::BlockId::NONE,
    });
    Ok(u32::from(nid))
}

/// Accumulates properties and serializes the PC heap image.
#[derive(Default)]
pub struct PropertyContextWriter {
    properties: BTreeMap<u16, PropertyValue>,
}

impl PropertyContextWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prop_id: u16, value: PropertyValue) {
        self.properties.insert(prop_id, value);
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Serialize the PC: values onto the heap or into sub-nodes, records into
    /// the BTH, and return the heap block images.
    pub fn finish<F>(
        self,
        ndb: &mut NdbWriter<F>,
        nodes: &mut LtpNodeAllocator,
        subnodes: &mut Vec<SubNodeEntry>,
    ) -> io::Result<Vec<Vec<u8>>>
    where
        F: Read + Write + Seek,
    {
        let mut heap = HeapWriter::new(HeapClientSignature::Properties);

        let mut records = Vec::with_capacity(self.properties.len());
        for (prop_id, value) in &self.properties {
            let hnid = value_hnid(value, &mut heap, ndb, nodes, subnodes)?;

            let mut record = Vec::with_capacity(8);
            // wPropId
            record.extend_from_slice(&prop_id.to_le_bytes());
            // wPropType
            record.extend_from_slice(&value.prop_type().to_le_bytes());
            // dwValueHnid
            record.extend_from_slice(&hnid.to_le_bytes());
            records.push(record);
        }

        let root = write_tree_on_heap(&mut heap, 2, 6, &records)?;
        heap.set_user_root(root);
        Ok(heap.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_property_records_are_sorted_and_typed() {
        let mut pc = PropertyContextWriter::new();
        pc.insert(0x0E07, PropertyValue::Integer32(1));
        pc.insert(0x0037, PropertyValue::Unicode("Hi".into()));
        pc.insert(0x0E1F, PropertyValue::Boolean(true));

        let mut ndb = NdbWriter::new(Cursor::new(Vec::new()));
        let mut nodes = LtpNodeAllocator::default();
        let mut subnodes = Vec::new();
        let images = pc.finish(&mut ndb, &mut nodes, &mut subnodes).unwrap();

        assert!(subnodes.is_empty());
        let image = &images[0];
        // bClientSig
        assert_eq!(image[3], 0xBC);

        // Allocation 1: the 4-byte UTF-16LE payload of 0x0037.
        assert_eq!(&image[12..16], &[b'H', 0, b'i', 0]);
        // Allocation 2: three sorted 8-byte records.
        let records = &image[16..40];
        assert_eq!(u16::from_le_bytes([records[0], records[1]]), 0x0037);
        assert_eq!(u16::from_le_bytes([records[2], records[3]]), PTYPE_UNICODE);
        assert_eq!(u32::from_le_bytes(records[4..8].try_into().unwrap()), 0x20);
        assert_eq!(u16::from_le_bytes([records[8], records[9]]), 0x0E07);
        assert_eq!(
            u32::from_le_bytes(records[12..16].try_into().unwrap()),
            1
        );
        assert_eq!(u16::from_le_bytes([records[16], records[17]]), 0x0E1F);
        assert_eq!(
            u16::from_le_bytes([records[18], records[19]]),
            PTYPE_BOOLEAN
        );
    }

    #[test]
    fn test_large_binary_spills_to_subnode() {
        let mut pc = PropertyContextWriter::new();
        pc.insert(0x3701, PropertyValue::Binary(vec![0x42; 10_000]));

        let mut ndb = NdbWriter::new(Cursor::new(Vec::new()));
        let mut nodes = LtpNodeAllocator::default();
        let mut subnodes = Vec::new();
        pc.finish(&mut ndb, &mut nodes, &mut subnodes).unwrap();

        assert_eq!(subnodes.len(), 1);
        // 10,000 bytes need two data blocks plus an XBLOCK.
        assert!(subnodes[0].data.is_internal());
    }

    #[test]
    fn test_empty_string_is_null_hnid() {
        let mut pc = PropertyContextWriter::new();
        pc.insert(0x0037, PropertyValue::Unicode(String::new()));

        let mut ndb = NdbWriter::new(Cursor::new(Vec::new()));
        let mut nodes = LtpNodeAllocator::default();
        let mut subnodes = Vec::new();
        let images = pc.finish(&mut ndb, &mut nodes, &mut subnodes).unwrap();

        let image = &images[0];
        // Single record allocation at 12: hnid is 0.
        assert_eq!(u32::from_le_bytes(image[16..20].try_into().unwrap()), 0);
    }
}
