//! ## [BTH (BTree-on-Heap)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/2dd1a95a-c8b1-4ac5-87d1-10cb8de64053)

use byteorder::{LittleEndian, WriteBytesExt};

use super::{
    heap::{HeapId, HeapWriter, MAX_HEAP_ALLOC},
    *,
};

/// `bType` of a BTHHEADER.
const TREE_SIGNATURE: u8 = 0xB5;

/// Serialize a BTree-on-Heap over `records` and return the HID of its header.
///
/// Each record is `key_size` key bytes followed by `data_size` bytes, sorted
/// by key. Leaf groups that outgrow a single heap allocation gain index
/// levels of (key, HID) entries above them.
pub fn write_tree_on_heap(
    heap: &mut HeapWriter,
    key_size: u8,
    data_size: u8,
    records: &[Vec<u8>],
) -> LtpResult<HeapId> {
    let record_size = key_size as usize + data_size as usize;
    if !matches!(key_size, 2 | 4 | 8 | 16) || record_size == 0 {
        return Err(LtpError::InvalidTreeRecordSize(key_size, data_size));
    }
    debug_assert!(records.iter().all(|record| record.len() == record_size));

    let mut levels = 0_u8;
    let root = if records.is_empty() {
        HeapId::NONE
    } else {
        // Pack the current level into heap allocations; as long as more than
        // one allocation results, build an index level of (key, HID) entries.
        let mut level_records: Vec<Vec<u8>> = records.to_vec();
        let mut level_record_size = record_size;
        loop {
            let per_alloc = MAX_HEAP_ALLOC / level_record_size;
            let mut alloc_refs = Vec::new();
            for group in level_records.chunks(per_alloc) {
                let mut data = Vec::with_capacity(group.len() * level_record_size);
                for record in group {
                    data.extend_from_slice(record);
                }
                let hid = heap.allocate(&data)?;
                alloc_refs.push((group[0][..key_size as usize].to_vec(), hid));
            }

            if alloc_refs.len() == 1 {
                break alloc_refs[0].1;
            }

            levels += 1;
            level_record_size = key_size as usize + 4;
            level_records = alloc_refs
                .into_iter()
                .map(|(key, hid)| {
                    let mut record = key;
                    record.extend_from_slice(&u32::from(hid).to_le_bytes());
                    record
                })
                .collect();
        }
    };

    let mut header = Vec::with_capacity(8);
    // bType
    header.write_u8(TREE_SIGNATURE).expect("vec write");
    // cbKey
    header.write_u8(key_size).expect("vec write");
    // cbEnt
    header.write_u8(data_size).expect("vec write");
    // bIdxLevels
    header.write_u8(levels).expect("vec write");
    // hidRoot
    header
        .write_u32::<LittleEndian>(u32::from(root))
        .expect("vec write");

    heap.allocate(&header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ltp::heap::HeapClientSignature;

    fn record(key: u16, value: u32) -> Vec<u8> {
        let mut bytes = key.to_le_bytes().to_vec();
        bytes.extend_from_slice(&value.to_le_bytes());
        bytes
    }

    #[test]
    fn test_empty_tree_has_null_root() {
        let mut heap = HeapWriter::new(HeapClientSignature::Properties);
        let hid = write_tree_on_heap(&mut heap, 2, 6, &[]).unwrap();

        let images = heap.finish();
        let image = &images[0];
        // The only allocation is the 8-byte header at offset 12.
        assert_eq!(image[12], TREE_SIGNATURE);
        assert_eq!(image[13], 2); // cbKey
        assert_eq!(image[14], 6); // cbEnt
        assert_eq!(image[15], 0); // bIdxLevels
        assert_eq!(u32::from_le_bytes(image[16..20].try_into().unwrap()), 0);
        assert_ne!(u32::from(hid), 0);
    }

    #[test]
    fn test_single_leaf_records_inline() {
        let mut heap = HeapWriter::new(HeapClientSignature::Properties);
        let records = vec![record(0x0037, 1), record(0x0E07, 2)];
        write_tree_on_heap(&mut heap, 2, 6, &records).unwrap();

        let images = heap.finish();
        let image = &images[0];
        // First allocation: the 16 bytes of leaf records.
        assert_eq!(u16::from_le_bytes([image[12], image[13]]), 0x0037);
        assert_eq!(u16::from_le_bytes([image[20], image[21]]), 0x0E07);
        // Second allocation: header with bIdxLevels = 0 pointing at the leaf.
        assert_eq!(image[28], TREE_SIGNATURE);
        assert_eq!(image[31], 0);
        assert_eq!(u32::from_le_bytes(image[32..36].try_into().unwrap()), 0x20);
    }

    #[test]
    fn test_large_tree_gains_index_level() {
        let mut heap = HeapWriter::new(HeapClientSignature::Properties);
        // 600 8-byte records exceed one 3580-byte allocation.
        let records: Vec<Vec<u8>> = (0..600_u16).map(|key| record(key, key as u32)).collect();
        write_tree_on_heap(&mut heap, 2, 6, &records).unwrap();

        let images = heap.finish();
        // Find the header allocation: last alloc of the final block.
        let image = &images[0];
        let ibhnpm = u16::from_le_bytes([image[0], image[1]]) as usize;
        let calloc = u16::from_le_bytes([image[ibhnpm], image[ibhnpm + 1]]) as usize;
        let last_start = u16::from_le_bytes([
            image[ibhnpm + 2 + 2 * (calloc - 1)],
            image[ibhnpm + 2 + 2 * (calloc - 1) + 1],
        ]) as usize;
        assert_eq!(image[last_start], TREE_SIGNATURE);
        assert_eq!(image[last_start + 3], 1); // one index level
    }
}
