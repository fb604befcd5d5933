//! ## [TC (Table Context)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/5e48be0d-a75a-4918-a277-50408ff96740)
//!
//! A TC is a fixed-stride row matrix over declared columns, with a row-index
//! BTree-on-Heap mapping row IDs to row ordinals. Hierarchy, Contents,
//! Recipient and Attachment tables are all TCs.

use byteorder::{LittleEndian, WriteBytesExt};
use std::{
    collections::BTreeMap,
    io::{self, Read, Seek, Write},
};

use super::{
    heap::{HeapClientSignature, HeapId, HeapWriter, MAX_HEAP_ALLOC},
    prop_context::*,
    tree::write_tree_on_heap,
    *,
};
use crate::ndb::{block::SubNodeEntry, block_id::BlockId, writer::NdbWriter, MAX_BLOCK_DATA};

/// `bType` of a TCINFO.
const TABLE_SIGNATURE: u8 = 0x7C;

/// The row-ID column present in every TC.
pub const TAG_LTP_ROW_ID: u32 = 0x67F2_0003;

struct ColumnLayout {
    tag: u32,
    offset: u16,
    size: u8,
    bit: u8,
}

/// Bytes a column of this property type occupies in a row: fixed values
/// inline, variable values as a 4-byte HNID.
fn cell_size(prop_type: u16) -> u8 {
    match prop_type {
        PTYPE_BOOLEAN => 1,
        PTYPE_INTEGER16 => 2,
        PTYPE_INTEGER64 | PTYPE_TIME => 8,
        _ => 4,
    }
}

/// Accumulates rows and serializes the TC heap image.
pub struct TableContextWriter {
    columns: Vec<ColumnLayout>,
    end_4byte: u16,
    end_2byte: u16,
    end_1byte: u16,
    stride: u16,
    rows: Vec<(u32, BTreeMap<u16, PropertyValue>)>,
}

impl TableContextWriter {
    /// Declare the columns up front. `tags` excludes the row-ID column,
    /// which every table carries at offset 0.
    pub fn new(tags: &[u32]) -> LtpResult<Self> {
        if tags.len() + 1 > 0xFF {
            return Err(LtpError::TooManyColumns(tags.len() + 1));
        }

        let mut columns = vec![ColumnLayout {
            tag: TAG_LTP_ROW_ID,
            offset: 0,
            size: 4,
            bit: 0,
        }];
        for (index, &tag) in tags.iter().enumerate() {
            columns.push(ColumnLayout {
                tag,
                offset: 0,
                size: cell_size(tag as u16),
                bit: (index + 1) as u8,
            });
        }

        // Offsets group by cell size, descending, with the row ID pinned
        // first; declaration order is preserved inside each group.
        let mut offset = 4_u16;
        let (mut end_4byte, mut end_2byte, mut end_1byte) = (4_u16, 4_u16, 4_u16);
        for size in [8_u8, 4, 2, 1] {
            for column in columns.iter_mut().skip(1) {
                if column.size == size {
                    column.offset = offset;
                    offset += size as u16;
                }
            }
            match size {
                4 => end_4byte = offset,
                2 => end_2byte = offset,
                1 => end_1byte = offset,
                _ => {}
            }
        }

        let bitmap_bytes = columns.len().div_ceil(8) as u16;
        let stride = end_1byte + bitmap_bytes;

        Ok(Self {
            columns,
            end_4byte,
            end_2byte,
            end_1byte,
            stride,
            rows: Vec::new(),
        })
    }

    /// Append a row keyed by `row_id` (the NID of the referenced object).
    /// Values must belong to declared columns.
    pub fn add_row(
        &mut self,
        row_id: u32,
        values: BTreeMap<u16, PropertyValue>,
    ) -> LtpResult<()> {
        for (&prop_id, value) in &values {
            let tag = ((prop_id as u32) << 16) | value.prop_type() as u32;
            if !self.columns.iter().any(|column| column.tag == tag) {
                return Err(LtpError::UndeclaredColumn(prop_id));
            }
        }
        self.rows.push((row_id, values));
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn serialize_row<F>(
        &self,
        row_id: u32,
        values: &BTreeMap<u16, PropertyValue>,
        heap: &mut HeapWriter,
        ndb: &mut NdbWriter<F>,
        nodes: &mut LtpNodeAllocator,
        subnodes: &mut Vec<SubNodeEntry>,
    ) -> io::Result<Vec<u8>>
    where
        F: Read + Write + Seek,
    {
        let mut row = vec![0_u8; self.stride as usize];
        let set_bit = |row: &mut Vec<u8>, bit: u8| {
            row[self.end_1byte as usize + bit as usize / 8] |= 1 << (7 - bit % 8);
        };

        // dwRowID
        row[0..4].copy_from_slice(&row_id.to_le_bytes());
        set_bit(&mut row, 0);

        for column in self.columns.iter().skip(1) {
            let prop_id = (column.tag >> 16) as u16;
            let Some(value) = values.get(&prop_id) else {
                continue;
            };

            let offset = column.offset as usize;
            match value {
                PropertyValue::Boolean(flag) => row[offset] = u8::from(*flag),
                PropertyValue::Integer16(value) => {
                    row[offset..offset + 2].copy_from_slice(&value.to_le_bytes())
                }
                PropertyValue::Integer32(value) => {
                    row[offset..offset + 4].copy_from_slice(&value.to_le_bytes())
                }
                PropertyValue::Integer64(value) | PropertyValue::Time(value) => {
                    row[offset..offset + 8].copy_from_slice(&value.to_le_bytes())
                }
                variable => {
                    let hnid = value_hnid(variable, heap, ndb, nodes, subnodes)?;
                    if hnid == 0 {
                        continue;
                    }
                    row[offset..offset + 4].copy_from_slice(&hnid.to_le_bytes());
                }
            }
            set_bit(&mut row, column.bit);
        }

        Ok(row)
    }

    /// Serialize the TC and return the heap block images.
    pub fn finish<F>(
        self,
        ndb: &mut NdbWriter<F>,
        nodes: &mut LtpNodeAllocator,
        subnodes: &mut Vec<SubNodeEntry>,
    ) -> io::Result<Vec<Vec<u8>>>
    where
        F: Read + Write + Seek,
    {
        let mut heap = HeapWriter::new(HeapClientSignature::Table);

        // Row matrix.
        let mut row_images = Vec::with_capacity(self.rows.len());
        for (row_id, values) in &self.rows {
            row_images.push(self.serialize_row(*row_id, values, &mut heap, ndb, nodes, subnodes)?);
        }

        let total: usize = row_images.iter().map(Vec::len).sum();
        let rows_hnid = if row_images.is_empty() {
            0
        } else if total <= MAX_HEAP_ALLOC {
            let data: Vec<u8> = row_images.concat();
            u32::from(heap.allocate(&data)?)
        } else {
            // Rows never straddle block boundaries.
            let rows_per_block = MAX_BLOCK_DATA / self.stride as usize;
            let blocks: Vec<Vec<u8>> = row_images
                .chunks(rows_per_block)
                .map(|chunk| chunk.concat())
                .collect();
            let nid = nodes.allocate()?;
            let data = ndb.write_data_blocks(&blocks)?;
            subnodes.push(SubNodeEntry {
                nid,
                data,
                sub: BlockId::NONE,
            });
            u32::from(nid)
        };

        // Row index: dwRowID -> row ordinal.
        let mut index_records: Vec<(u32, u32)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(ordinal, (row_id, _))| (*row_id, ordinal as u32))
            .collect();
        index_records.sort_by_key(|(row_id, _)| *row_id);
        let index_records: Vec<Vec<u8>> = index_records
            .into_iter()
            .map(|(row_id, ordinal)| {
                let mut record = row_id.to_le_bytes().to_vec();
                record.extend_from_slice(&ordinal.to_le_bytes());
                record
            })
            .collect();
        let row_index = write_tree_on_heap(&mut heap, 4, 4, &index_records)?;

        // TCINFO
        let mut info = Vec::with_capacity(22 + self.columns.len() * 8);
        // bType
        info.write_u8(TABLE_SIGNATURE).expect("vec write");
        // cCols
        info.write_u8(self.columns.len() as u8).expect("vec write");
        // rgib: TCI_4b, TCI_2b, TCI_1b, TCI_bm
        info.write_u16::<LittleEndian>(self.end_4byte)
            .expect("vec write");
        info.write_u16::<LittleEndian>(self.end_2byte)
            .expect("vec write");
        info.write_u16::<LittleEndian>(self.end_1byte)
            .expect("vec write");
        info.write_u16::<LittleEndian>(self.stride).expect("vec write");
        // hidRowIndex
        info.write_u32::<LittleEndian>(u32::from(row_index))
            .expect("vec write");
        // hnidRows
        info.write_u32::<LittleEndian>(rows_hnid).expect("vec write");
        // hidIndex (deprecated)
        info.write_u32::<LittleEndian>(0).expect("vec write");
        // rgTCOLDESC
        let mut sorted_columns: Vec<&ColumnLayout> = self.columns.iter().collect();
        sorted_columns.sort_by_key(|column| column.tag);
        for column in sorted_columns {
            info.write_u32::<LittleEndian>(column.tag).expect("vec write");
            info.write_u16::<LittleEndian>(column.offset)
                .expect("vec write");
            info.write_u8(column.size).expect("vec write");
            info.write_u8(column.bit).expect("vec write");
        }

        let root = heap.allocate(&info)?;
        heap.set_user_root(root);
        Ok(heap.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TAG_DISPLAY_NAME: u32 = 0x3001_001F;
    const TAG_CONTENT_COUNT: u32 = 0x3602_0003;
    const TAG_SUBFOLDERS: u32 = 0x360A_000B;
    const TAG_DELIVERY_TIME: u32 = 0x0E06_0040;

    fn hierarchy_table() -> TableContextWriter {
        TableContextWriter::new(&[
            TAG_DISPLAY_NAME,
            TAG_CONTENT_COUNT,
            TAG_SUBFOLDERS,
            TAG_DELIVERY_TIME,
        ])
        .unwrap()
    }

    #[test]
    fn test_column_layout_groups_by_size() {
        let tc = hierarchy_table();
        // rowid at 0; the 8-byte Time first after it; then 4-byte cells in
        // declaration order; the Boolean last before the bitmap.
        let by_tag = |tag: u32| tc.columns.iter().find(|c| c.tag == tag).unwrap();
        assert_eq!(by_tag(TAG_LTP_ROW_ID).offset, 0);
        assert_eq!(by_tag(TAG_DELIVERY_TIME).offset, 4);
        assert_eq!(by_tag(TAG_DISPLAY_NAME).offset, 12);
        assert_eq!(by_tag(TAG_CONTENT_COUNT).offset, 16);
        assert_eq!(by_tag(TAG_SUBFOLDERS).offset, 20);
        assert_eq!(tc.end_4byte, 20);
        assert_eq!(tc.end_2byte, 20);
        assert_eq!(tc.end_1byte, 21);
        assert_eq!(tc.stride, 22);
    }

    #[test]
    fn test_undeclared_column_is_refused() {
        let mut tc = hierarchy_table();
        let mut values = BTreeMap::new();
        values.insert(0x0037_u16, PropertyValue::Unicode("nope".into()));
        assert!(matches!(
            tc.add_row(0x8004, values),
            Err(LtpError::UndeclaredColumn(0x0037))
        ));
    }

    #[test]
    fn test_rows_and_existence_bitmap() {
        let mut tc = hierarchy_table();
        let mut values = BTreeMap::new();
        values.insert(0x3001_u16, PropertyValue::Unicode("Inbox".into()));
        values.insert(0x3602_u16, PropertyValue::Integer32(5));
        values.insert(0x360A_u16, PropertyValue::Boolean(false));
        tc.add_row(0x8004, values).unwrap();

        let mut ndb = NdbWriter::new(Cursor::new(Vec::new()));
        let mut nodes = LtpNodeAllocator::default();
        let mut subnodes = Vec::new();
        let images = tc.finish(&mut ndb, &mut nodes, &mut subnodes).unwrap();
        let image = &images[0];

        // bClientSig identifies a TC.
        assert_eq!(image[3], 0x7C);

        // Allocation 1: "Inbox" UTF-16LE (10 bytes) at offset 12.
        assert_eq!(&image[12..14], &[b'I', 0]);
        // Allocation 2: the single 22-byte row.
        let row = &image[22..44];
        assert_eq!(u32::from_le_bytes(row[0..4].try_into().unwrap()), 0x8004);
        // Display name cell holds the HID of allocation 1.
        assert_eq!(u32::from_le_bytes(row[12..16].try_into().unwrap()), 0x20);
        assert_eq!(u32::from_le_bytes(row[16..20].try_into().unwrap()), 5);
        // Boolean false still occupies its cell.
        assert_eq!(row[20], 0);
        // CEB: bits 0 (rowid), 1 (name), 2 (count), 3 (subfolders) set;
        // bit 4 (time, absent) clear.
        assert_eq!(row[21], 0b1111_0000);
    }

    #[test]
    fn test_empty_table_has_no_rows() {
        let tc = hierarchy_table();
        let mut ndb = NdbWriter::new(Cursor::new(Vec::new()));
        let mut nodes = LtpNodeAllocator::default();
        let mut subnodes = Vec::new();
        let images = tc.finish(&mut ndb, &mut nodes, &mut subnodes).unwrap();

        // TCINFO is the last allocation; hnidRows is 0.
        let image = &images[0];
        let ibhnpm = u16::from_le_bytes([image[0], image[1]]) as usize;
        let calloc = u16::from_le_bytes([image[ibhnpm], image[ibhnpm + 1]]) as usize;
        let last = u16::from_le_bytes([
            image[ibhnpm + 2 + 2 * (calloc - 1)],
            image[ibhnpm + 2 + 2 * (calloc - 1) + 1],
        ]) as usize;
        assert_eq!(image[last], TABLE_SIGNATURE);
        let hnid_rows = u32::from_le_bytes(image[last + 14..last + 18].try_into().unwrap());
        assert_eq!(hnid_rows, 0);
    }

    #[test]
    fn test_many_rows_spill_to_subnode() {
        let mut tc = hierarchy_table();
        for index in 0..400_u32 {
            let mut values = BTreeMap::new();
            values.insert(0x3602_u16, PropertyValue::Integer32(index as i32));
            tc.add_row(0x8000 + index, values).unwrap();
        }

        let mut ndb = NdbWriter::new(Cursor::new(Vec::new()));
        let mut nodes = LtpNodeAllocator::default();
        let mut subnodes = Vec::new();
        tc.finish(&mut ndb, &mut nodes, &mut subnodes).unwrap();

        // 400 rows x 22 bytes = 8800 bytes: out of the heap, into a sub-node.
        assert_eq!(subnodes.len(), 1);
    }
}
