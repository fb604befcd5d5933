//! ## [Named Property Lookup Map](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/e17e195d-0454-4b9b-b398-c9127a26a678)

use std::io::{self, Read, Seek, Write};

use super::*;
use crate::crc::compute_crc;
use crate::ltp::prop_context::utf16le_bytes;
use crate::ndb::{node_id::NID_NAME_TO_ID_MAP, writer::NdbWriter};

/// `PidTagNameidBucketCount`
const PID_BUCKET_COUNT: u16 = 0x0001;
/// `PidTagNameidStreamGuid`
const PID_STREAM_GUID: u16 = 0x0002;
/// `PidTagNameidStreamEntry`
const PID_STREAM_ENTRY: u16 = 0x0003;
/// `PidTagNameidStreamString`
const PID_STREAM_STRING: u16 = 0x0004;
/// `PidTagNameidBucketBase`
const PID_BUCKET_BASE: u16 = 0x1000;

const BUCKET_COUNT: u32 = 251;

/// `PS_MAPI`
pub const PS_MAPI: [u8; 16] = [
    0x28, 0x03, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46,
];
/// `PS_PUBLIC_STRINGS`
pub const PS_PUBLIC_STRINGS: [u8; 16] = [
    0x29, 0x03, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46,
];

/// A named property: a GUID-scoped numeric or string name.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PropertyName {
    Id(u32),
    String(String),
}

/// Assigns property IDs in 0x8000.. to named properties in encounter order
/// and serializes the name-to-ID map node.
#[derive(Default, Debug)]
pub struct NameIdMap {
    entries: Vec<([u8; 16], PropertyName)>,
}

impl NameIdMap {
    /// Look up a named property, assigning the next ID on first sight.
    pub fn get_or_assign(&mut self, guid: [u8; 16], name: PropertyName) -> u16 {
        if let Some(index) = self
            .entries
            .iter()
            .position(|(entry_guid, entry_name)| *entry_guid == guid && *entry_name == name)
        {
            return 0x8000 + index as u16;
        }
        self.entries.push((guid, name));
        0x8000 + (self.entries.len() - 1) as u16
    }

    /// `wGuid`: 1 and 2 pick the well-known property sets, 3+ index the GUID
    /// stream.
    fn guid_index(guid_stream: &mut Vec<u8>, guid: &[u8; 16]) -> u16 {
        if *guid == PS_MAPI {
            return 1;
        }
        if *guid == PS_PUBLIC_STRINGS {
            return 2;
        }
        if let Some(position) = guid_stream
            .chunks_exact(16)
            .position(|existing| existing == guid)
        {
            return 3 + position as u16;
        }
        guid_stream.extend_from_slice(guid);
        3 + (guid_stream.len() / 16 - 1) as u16
    }

    /// Write the map node with its GUID, entry, string and hash-bucket
    /// streams.
    pub(crate) fn write<F>(self, ndb: &mut NdbWriter<F>) -> io::Result<()>
    where
        F: Read + Write + Seek,
    {
        let mut guid_stream = Vec::new();
        let mut entry_stream = Vec::new();
        let mut string_stream = Vec::new();
        let mut buckets: Vec<Vec<u8>> = vec![Vec::new(); BUCKET_COUNT as usize];

        for (index, (guid, name)) in self.entries.iter().enumerate() {
            let guid_index = Self::guid_index(&mut guid_stream, guid);

            let (id_or_offset, is_string, hash) = match name {
                PropertyName::Id(id) => (*id, 0_u16, *id),
                PropertyName::String(text) => {
                    let offset = string_stream.len() as u32;
                    let bytes = utf16le_bytes(text);
                    string_stream.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                    string_stream.extend_from_slice(&bytes);
                    // Entries in the string stream are 4-byte aligned.
                    while string_stream.len() % 4 != 0 {
                        string_stream.push(0);
                    }
                    (offset, 1, compute_crc(0, &bytes))
                }
            };

            let mut record = [0_u8; 8];
            record[0..4].copy_from_slice(&id_or_offset.to_le_bytes());
            record[4..6].copy_from_slice(&((guid_index << 1) | is_string).to_le_bytes());
            record[6..8].copy_from_slice(&(index as u16).to_le_bytes());

            entry_stream.extend_from_slice(&record);
            buckets[(hash % BUCKET_COUNT) as usize].extend_from_slice(&record);
        }

        let mut pc = PropertyContextWriter::new();
        pc.insert(
            PID_BUCKET_COUNT,
            PropertyValue::Integer32(BUCKET_COUNT as i32),
        );
        pc.insert(PID_STREAM_GUID, PropertyValue::Binary(guid_stream));
        pc.insert(PID_STREAM_ENTRY, PropertyValue::Binary(entry_stream));
        pc.insert(PID_STREAM_STRING, PropertyValue::Binary(string_stream));
        for (index, bucket) in buckets.into_iter().enumerate() {
            if !bucket.is_empty() {
                pc.insert(PID_BUCKET_BASE + index as u16, PropertyValue::Binary(bucket));
            }
        }

        let (data, sub) = write_pc_node(ndb, pc)?;
        ndb.add_node(NID_NAME_TO_ID_MAP, NID_NAME_TO_ID_MAP, data, sub)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_sequential_assignment() {
        let mut map = NameIdMap::default();
        let first = map.get_or_assign(PS_PUBLIC_STRINGS, PropertyName::String("Keywords".into()));
        let second = map.get_or_assign(PS_MAPI, PropertyName::Id(0x8233));
        let again = map.get_or_assign(PS_PUBLIC_STRINGS, PropertyName::String("Keywords".into()));
        assert_eq!(first, 0x8000);
        assert_eq!(second, 0x8001);
        assert_eq!(again, first);
    }

    #[test]
    fn test_empty_map_node_writes() {
        let mut ndb = NdbWriter::new(Cursor::new(Vec::new()));
        NameIdMap::default().write(&mut ndb).unwrap();
        let buffer = ndb.finish([0_u32; 32]).unwrap().into_inner();

        let nbt_ib = u64::from_le_bytes(buffer[224..232].try_into().unwrap()) as usize;
        let page = &buffer[nbt_ib..nbt_ib + 512];
        assert_eq!(u64::from_le_bytes(page[0..8].try_into().unwrap()), 0x61);
    }
}
