//! Append-only writer over the NDB layer of a growing PST file.
//!
//! Blocks are placed linearly from the first data offset, skipping the slots
//! reserved for allocation-map pages every 253,952 bytes. `finish` emits the
//! NBT/BBT B-trees, back-fills every AMap bitmap, writes the Density List and
//! header, and verifies the B-tree roots by readback.

use std::io::{self, Read, Seek, SeekFrom, Write};

use super::{
    block::*,
    block_id::BlockId,
    header::{Header, PageRef, Root},
    node_id::NodeId,
    page::*,
    *,
};
use crate::crc::compute_crc;

/// Offset of the Density List page.
const DLIST_OFFSET: u64 = 0x4200;

/// Offset of the first AMap page; data placement starts here.
const FIRST_AMAP_OFFSET: u64 = 0x4400;

/// A PMap page follows every eighth AMap page.
const PMAPS_PER_AMAP: u64 = 8;

struct BlockLocator {
    bid: BlockId,
    ib: u64,
    cb: u16,
}

struct NodeEntry {
    nid: NodeId,
    data: BlockId,
    sub: BlockId,
    parent: NodeId,
}

pub struct NdbWriter<F> {
    file: F,
    cursor: u64,
    next_block_index: u64,
    next_page_index: u64,
    amap_count: u64,
    blocks: Vec<BlockLocator>,
    nodes: Vec<NodeEntry>,
}

impl<F> NdbWriter<F>
where
    F: Read + Write + Seek,
{
    pub fn new(file: F) -> Self {
        Self {
            file,
            cursor: FIRST_AMAP_OFFSET,
            next_block_index: 1,
            next_page_index: 1,
            amap_count: 0,
            blocks: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Offset of AMap page `index`.
    fn amap_offset(index: u64) -> u64 {
        FIRST_AMAP_OFFSET + index * AMAP_DATA_RANGE
    }

    /// Bytes of map pages sitting at the start of AMap range `index`: the
    /// AMap page itself plus a PMap page on every eighth.
    fn map_reserved_len(index: u64) -> u64 {
        if index % PMAPS_PER_AMAP == 0 {
            2 * PAGE_SIZE as u64
        } else {
            PAGE_SIZE as u64
        }
    }

    /// Reserve `size` bytes at the next `align`-aligned offset, stepping over
    /// scheduled map-page slots.
    fn alloc(&mut self, size: u64, align: u64) -> NdbResult<u64> {
        loop {
            // Enter the next AMap range when the cursor reaches it.
            while self.amap_count < (self.cursor - FIRST_AMAP_OFFSET) / AMAP_DATA_RANGE + 1 {
                let boundary = Self::amap_offset(self.amap_count);
                if self.cursor == boundary {
                    self.cursor += Self::map_reserved_len(self.amap_count);
                }
                self.amap_count += 1;
            }

            let start = self.cursor.next_multiple_of(align);
            let end = start + size;
            let next_boundary = Self::amap_offset(self.amap_count);
            if end <= next_boundary {
                if end > MAX_FILE_SIZE {
                    return Err(NdbError::SpaceExhausted(end));
                }
                self.cursor = end;
                return Ok(start);
            }
            self.cursor = next_boundary;
        }
    }

    /// Write one block (data plus trailer) and record it for the BBT.
    pub fn write_block(&mut self, data: &[u8], internal: bool) -> io::Result<BlockId> {
        let bid = BlockId::new(internal, self.next_block_index)?;
        self.next_block_index += 1;

        let slot = block_slot_size(data.len());
        let ib = self.alloc(slot as u64, 64)?;
        let image = serialize_block(data, bid, ib)?;

        self.file.seek(SeekFrom::Start(ib))?;
        self.file.write_all(&image)?;

        self.blocks.push(BlockLocator {
            bid,
            ib,
            cb: data.len() as u16,
        });
        Ok(bid)
    }

    /// Write node data of any size: a single block when it fits, otherwise a
    /// chain of blocks under an XBLOCK, escalating to an XXBLOCK of XBLOCKs.
    pub fn write_data(&mut self, data: &[u8]) -> io::Result<BlockId> {
        if data.len() <= MAX_BLOCK_DATA {
            return self.write_block(data, false);
        }

        let chunks: Vec<&[u8]> = data.chunks(MAX_BLOCK_DATA).collect();
        let mut bids = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            bids.push(self.write_block(chunk, false)?);
        }

        if bids.len() <= XBLOCK_CAPACITY {
            return self.write_block(&xblock_data(1, data.len() as u64, &bids), true);
        }

        let mut xblock_bids = Vec::new();
        for (group_index, group) in bids.chunks(XBLOCK_CAPACITY).enumerate() {
            let start = group_index * XBLOCK_CAPACITY * MAX_BLOCK_DATA;
            let end = (start + group.len() * MAX_BLOCK_DATA).min(data.len());
            let group_total = (end - start) as u64;
            xblock_bids.push(self.write_block(&xblock_data(1, group_total, group), true)?);
        }
        self.write_block(&xblock_data(2, data.len() as u64, &xblock_bids), true)
    }

    /// Write multiple pre-split block payloads as one node data tree, keeping
    /// the caller's block boundaries. Used for Heap-on-Node streams whose
    /// blocks are addressed by ordinal.
    pub fn write_data_blocks(&mut self, blocks: &[Vec<u8>]) -> io::Result<BlockId> {
        debug_assert!(!blocks.is_empty());
        if blocks.len() == 1 {
            return self.write_block(&blocks[0], false);
        }

        let total: u64 = blocks.iter().map(|block| block.len() as u64).sum();
        let mut bids = Vec::with_capacity(blocks.len());
        for block in blocks {
            bids.push(self.write_block(block, false)?);
        }
        if bids.len() > XBLOCK_CAPACITY {
            return Err(NdbError::BlockDataTooLarge(total as usize).into());
        }
        self.write_block(&xblock_data(1, total, &bids), true)
    }

    /// Write a sub-node tree leaf (SLBLOCK) over the given entries.
    pub fn write_subnodes(&mut self, entries: &mut [SubNodeEntry]) -> io::Result<BlockId> {
        entries.sort_by_key(|entry| u32::from(entry.nid));
        let data = slblock_data(entries)?;
        self.write_block(&data, true)
    }

    /// Register a node in the NBT.
    pub fn add_node(
        &mut self,
        nid: NodeId,
        parent: NodeId,
        data: BlockId,
        sub: BlockId,
    ) -> NdbResult<()> {
        if self.nodes.iter().any(|node| node.nid == nid) {
            return Err(NdbError::DuplicateNode(nid));
        }
        self.nodes.push(NodeEntry {
            nid,
            data,
            sub,
            parent,
        });
        Ok(())
    }

    /// Write one 512-byte page at a 512-aligned offset.
    fn write_page(&mut self, content: &[u8], page_type: PageType) -> io::Result<(u64, u64)> {
        let bid = self.next_page_index << 2;
        self.next_page_index += 1;

        let ib = self.alloc(PAGE_SIZE as u64, PAGE_SIZE as u64)?;
        let image = serialize_page(content, page_type, bid, ib);
        self.file.seek(SeekFrom::Start(ib))?;
        self.file.write_all(&image)?;
        Ok((bid, ib))
    }

    /// Write one level of a B-tree, returning the references the level above
    /// indexes it by.
    fn write_btree_level(
        &mut self,
        entries: &[(u64, Vec<u8>)],
        entry_size: u8,
        level: u8,
        page_type: PageType,
    ) -> io::Result<Vec<BTreePageRef>> {
        let max_entries = BTPAGE_ENTRY_SPACE / entry_size as usize;
        // Distribute evenly so every page lands at >= 50% fill.
        let page_count = entries.len().div_ceil(max_entries).max(1);
        let per_page = entries.len().div_ceil(page_count).max(1);

        let mut refs = Vec::with_capacity(page_count);
        if entries.is_empty() {
            let content = btpage_content(&[], entry_size, level);
            let (bid, ib) = self.write_page(&content, page_type)?;
            refs.push(BTreePageRef { key: 0, bid, ib });
            return Ok(refs);
        }

        for page_entries in entries.chunks(per_page) {
            let serialized: Vec<Vec<u8>> = page_entries
                .iter()
                .map(|(_, bytes)| bytes.clone())
                .collect();
            let content = btpage_content(&serialized, entry_size, level);
            let (bid, ib) = self.write_page(&content, page_type)?;
            refs.push(BTreePageRef {
                key: page_entries[0].0,
                bid,
                ib,
            });
        }
        Ok(refs)
    }

    /// Write a complete B-tree bottom-up and return the root reference.
    fn write_btree(
        &mut self,
        leaf_entries: Vec<(u64, Vec<u8>)>,
        leaf_entry_size: u8,
        page_type: PageType,
    ) -> io::Result<PageRef> {
        let mut refs = self.write_btree_level(&leaf_entries, leaf_entry_size, 0, page_type)?;
        let mut level = 1_u8;
        while refs.len() > 1 {
            let entries: Vec<(u64, Vec<u8>)> = refs
                .iter()
                .map(|page_ref| (page_ref.key, page_ref.serialize()))
                .collect();
            refs = self.write_btree_level(&entries, 24, level, page_type)?;
            level += 1;
        }
        let root = refs[0];
        Ok(PageRef {
            bid: root.bid,
            ib: root.ib,
        })
    }

    fn node_btree_entries(&mut self) -> Vec<(u64, Vec<u8>)> {
        self.nodes.sort_by_key(|node| u32::from(node.nid));
        self.nodes
            .iter()
            .map(|node| {
                let mut entry = Vec::with_capacity(32);
                // nid (zero-extended to 64 bits in leaf entries)
                entry.extend_from_slice(&u64::from(u32::from(node.nid)).to_le_bytes());
                // bidData
                entry.extend_from_slice(&u64::from(node.data).to_le_bytes());
                // bidSub
                entry.extend_from_slice(&u64::from(node.sub).to_le_bytes());
                // nidParent
                entry.extend_from_slice(&u32::from(node.parent).to_le_bytes());
                // dwPadding
                entry.extend_from_slice(&0_u32.to_le_bytes());
                (u64::from(u32::from(node.nid)), entry)
            })
            .collect()
    }

    fn block_btree_entries(&self) -> Vec<(u64, Vec<u8>)> {
        // Block indices increase monotonically, so the list is key-ordered.
        self.blocks
            .iter()
            .map(|block| {
                let mut entry = Vec::with_capacity(24);
                // BREF
                entry.extend_from_slice(&u64::from(block.bid).to_le_bytes());
                entry.extend_from_slice(&block.ib.to_le_bytes());
                // cb
                entry.extend_from_slice(&block.cb.to_le_bytes());
                // cRef
                entry.extend_from_slice(&2_u16.to_le_bytes());
                // dwPadding
                entry.extend_from_slice(&0_u32.to_le_bytes());
                (u64::from(block.bid), entry)
            })
            .collect()
    }

    /// Back-fill every AMap bitmap. All slots from the file start to `eof`
    /// are in use; the tail of the final range is free.
    fn write_amaps(&mut self, eof: u64) -> io::Result<(u64, u64)> {
        let mut free_bytes = 0_u64;
        let mut last_offset = FIRST_AMAP_OFFSET;

        for index in 0..self.amap_count {
            let offset = Self::amap_offset(index);
            last_offset = offset;

            let mut bitmap = [0_u8; PAGE_DATA_SIZE];
            let range_end = offset + AMAP_DATA_RANGE;
            let used_slots = if eof >= range_end {
                PAGE_DATA_SIZE as u64 * 8
            } else {
                (eof.saturating_sub(offset)).div_ceil(AMAP_SLOT_SIZE)
            };
            for slot in 0..(PAGE_DATA_SIZE as u64 * 8) {
                if slot < used_slots {
                    bitmap[(slot / 8) as usize] |= 1 << (7 - (slot % 8));
                } else {
                    free_bytes += AMAP_SLOT_SIZE;
                }
            }

            let image = serialize_page(&amap_content(&bitmap), PageType::AllocationMap, offset, offset);
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.write_all(&image)?;

            if index % PMAPS_PER_AMAP == 0 {
                let pmap_offset = offset + PAGE_SIZE as u64;
                let image =
                    serialize_page(&pmap_content(), PageType::AllocationPageMap, pmap_offset, pmap_offset);
                self.file.seek(SeekFrom::Start(pmap_offset))?;
                self.file.write_all(&image)?;
            }
        }

        Ok((last_offset, free_bytes))
    }

    /// Re-read a B-tree root page and verify its checksum.
    fn verify_readback(&mut self, page: PageRef) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(page.ib))?;
        let mut image = [0_u8; PAGE_SIZE];
        self.file.read_exact(&mut image)?;

        let stored = u32::from_le_bytes([image[500], image[501], image[502], image[503]]);
        if stored != compute_crc(0, &image[..PAGE_DATA_SIZE]) {
            return Err(NdbError::ReadbackCrcMismatch(page.ib).into());
        }
        Ok(())
    }

    /// Emit B-trees, allocation maps, the Density List and the header, then
    /// hand the underlying file back.
    pub fn finish(mut self, nids: [u32; 32]) -> io::Result<F> {
        let node_entries = self.node_btree_entries();
        let node_root = self.write_btree(node_entries, 32, PageType::NodeBTree)?;

        let block_entries = self.block_btree_entries();
        let block_root = self.write_btree(block_entries, 24, PageType::BlockBTree)?;

        let eof = self.cursor;
        let (amap_last, amap_free) = self.write_amaps(eof)?;

        // DList
        let dlist_bid = self.next_page_index << 2;
        self.next_page_index += 1;
        let image = serialize_page(&dlist_content(), PageType::DensityList, dlist_bid, DLIST_OFFSET);
        self.file.seek(SeekFrom::Start(DLIST_OFFSET))?;
        self.file.write_all(&image)?;

        let header = Header {
            next_page: self.next_page_index << 2,
            next_block: self.next_block_index << 2,
            unique: 1,
            nids,
            root: Root {
                file_eof: eof,
                amap_last,
                amap_free,
                node_btree: node_root,
                block_btree: block_root,
            },
        };
        self.file.seek(SeekFrom::Start(0))?;
        header.write(&mut self.file)?;

        self.verify_readback(node_root)?;
        self.verify_readback(block_root)?;
        self.file.flush()?;
        Ok(self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndb::node_id::NodeIdType;
    use std::io::Cursor;

    fn write_minimal(payload: &[u8]) -> Vec<u8> {
        let mut writer = NdbWriter::new(Cursor::new(Vec::new()));
        let bid = writer.write_block(payload, false).unwrap();
        writer
            .add_node(NodeId::from(0x21), NodeId::from(0), bid, BlockId::NONE)
            .unwrap();
        writer.finish([0_u32; 32]).unwrap().into_inner()
    }

    #[test]
    fn test_first_block_lands_after_first_map_pages() {
        let mut writer = NdbWriter::new(Cursor::new(Vec::new()));
        let offset = writer.alloc(64, 64).unwrap();
        assert_eq!(offset, 0x4800);
    }

    #[test]
    fn test_alloc_skips_amap_boundary() {
        let mut writer = NdbWriter::new(Cursor::new(Vec::new()));
        // Exhaust most of the first AMap range.
        while writer.cursor < FIRST_AMAP_OFFSET + AMAP_DATA_RANGE - 4096 {
            writer.alloc(4096, 64).unwrap();
        }
        let offset = writer.alloc(8192, 64).unwrap();
        // The next AMap (index 1, no PMap) sits at the boundary.
        assert_eq!(
            offset,
            FIRST_AMAP_OFFSET + AMAP_DATA_RANGE + PAGE_SIZE as u64
        );
    }

    #[test]
    fn test_deterministic_output() {
        assert_eq!(write_minimal(b"node payload"), write_minimal(b"node payload"));
        assert_ne!(write_minimal(b"node payload"), write_minimal(b"other data"));
    }

    #[test]
    fn test_xxblock_escalation_counts() {
        // 1022 chunks of 8176 bytes force an XXBLOCK.
        let mut writer = NdbWriter::new(Cursor::new(Vec::new()));
        let data = vec![0x5A_u8; (XBLOCK_CAPACITY + 1) * MAX_BLOCK_DATA];
        let top = writer.write_data(&data).unwrap();
        assert!(top.is_internal());
        // data blocks + 2 XBLOCKs + 1 XXBLOCK
        assert_eq!(writer.blocks.len(), XBLOCK_CAPACITY + 1 + 3);
    }

    #[test]
    fn test_btree_root_crc_verifies_many_nodes() {
        let mut writer = NdbWriter::new(Cursor::new(Vec::new()));
        for index in 0..40_u32 {
            let bid = writer
                .write_block(format!("payload {index}").as_bytes(), false)
                .unwrap();
            writer
                .add_node(
                    NodeId::new(NodeIdType::NormalMessage, 0x10000 + index).unwrap(),
                    NodeId::from(0),
                    bid,
                    BlockId::NONE,
                )
                .unwrap();
        }
        // 40 entries exceed one NBT leaf page, forcing an intermediate level;
        // finish readback-verifies the roots.
        writer.finish([0_u32; 32]).unwrap();
    }

    #[test]
    fn test_duplicate_node_is_refused() {
        let mut writer = NdbWriter::new(Cursor::new(Vec::new()));
        let bid = writer.write_block(b"x", false).unwrap();
        writer
            .add_node(NodeId::from(0x21), NodeId::from(0), bid, BlockId::NONE)
            .unwrap();
        assert!(matches!(
            writer.add_node(NodeId::from(0x21), NodeId::from(0), bid, BlockId::NONE),
            Err(NdbError::DuplicateNode(_))
        ));
    }

    #[test]
    fn test_header_readback_after_finish() {
        let buffer = write_minimal(b"payload");

        assert_eq!(&buffer[0..4], b"!BDN");
        let file_eof = u64::from_le_bytes(buffer[184..192].try_into().unwrap());
        assert_eq!(file_eof as usize, buffer.len());

        // NBT root page parses and holds the node.
        let nbt_ib = u64::from_le_bytes(buffer[224..232].try_into().unwrap()) as usize;
        let page = &buffer[nbt_ib..nbt_ib + PAGE_SIZE];
        assert_eq!(page[496], 0x81); // ptypeNBT
        assert_eq!(page[488], 1); // cEnt
        assert_eq!(u64::from_le_bytes(page[0..8].try_into().unwrap()), 0x21);

        // The first AMap page is fully allocated up to EOF.
        let amap = &buffer[FIRST_AMAP_OFFSET as usize..];
        assert_eq!(amap[0], 0xFF);
    }
}
