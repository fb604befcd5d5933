//! [Blocks](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/a9c1981d-d1ea-457c-b39e-dc7fb0eb95d4)
//!
//! Byte-image builders for data blocks, the XBLOCK/XXBLOCK data trees and the
//! SLBLOCK sub-node leaves. Placement on disk belongs to
//! [`writer`](super::writer).

use byteorder::{LittleEndian, WriteBytesExt};

use super::{block_id::BlockId, node_id::NodeId, *};
use crate::{block_sig::compute_sig, crc::compute_crc};

/// Size of the trailer terminating every block.
pub const BLOCK_TRAILER_SIZE: usize = 16;

/// BIDs held by one XBLOCK.
pub const XBLOCK_CAPACITY: usize = (MAX_BLOCK_DATA - 8) / 8;

/// Sub-node entries held by one SLBLOCK.
pub const SLBLOCK_CAPACITY: usize = (MAX_BLOCK_DATA - 8) / 24;

/// Total on-disk footprint of a block: data, padding to the next 64-byte
/// boundary, then the 16-byte trailer.
pub fn block_slot_size(data_len: usize) -> usize {
    (data_len + BLOCK_TRAILER_SIZE).div_ceil(64) * 64
}

/// Serialize a block image: `cb` bytes of data, zero padding, and the
/// [BLOCKTRAILER](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/a14943ef-70c2-403f-898c-5bc3747117e1).
pub fn serialize_block(data: &[u8], bid: BlockId, ib: u64) -> NdbResult<Vec<u8>> {
    if data.len() > MAX_BLOCK_DATA {
        return Err(NdbError::BlockDataTooLarge(data.len()));
    }

    let slot = block_slot_size(data.len());
    let mut image = Vec::with_capacity(slot);
    image.extend_from_slice(data);
    image.resize(slot - BLOCK_TRAILER_SIZE, 0);

    // cb
    image.extend_from_slice(&(data.len() as u16).to_le_bytes());
    // wSig
    image.extend_from_slice(&compute_sig(ib, u64::from(bid)).to_le_bytes());
    // dwCRC
    image.extend_from_slice(&compute_crc(0, data).to_le_bytes());
    // bid
    image.extend_from_slice(&u64::from(bid).to_le_bytes());

    Ok(image)
}

/// Build the data payload of an
/// [XBLOCK](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/5b7a6935-e83d-4917-9f62-6ce3707f09e0)
/// (`cLevel = 1`) or XXBLOCK (`cLevel = 2`).
pub fn xblock_data(level: u8, total_bytes: u64, bids: &[BlockId]) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + bids.len() * 8);
    // btype
    data.push(0x01);
    // cLevel
    data.push(level);
    // cEnt
    data.extend_from_slice(&(bids.len() as u16).to_le_bytes());
    // lcbTotal
    data.extend_from_slice(&(total_bytes as u32).to_le_bytes());
    // rgbid
    for bid in bids {
        data.extend_from_slice(&u64::from(*bid).to_le_bytes());
    }
    data
}

/// One leaf of a sub-node tree: an internal NID bound to its data block chain
/// and, optionally, a nested sub-node tree.
#[derive(Clone, Copy, Debug)]
pub struct SubNodeEntry {
    pub nid: NodeId,
    pub data: BlockId,
    pub sub: BlockId,
}

/// Build the data payload of an
/// [SLBLOCK](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/85c4d943-0779-43c5-bd98-61dc9bb5dfd6).
///
/// Entries must arrive sorted by NID; the on-disk tree is key-ordered.
pub fn slblock_data(entries: &[SubNodeEntry]) -> NdbResult<Vec<u8>> {
    if entries.len() > SLBLOCK_CAPACITY {
        return Err(NdbError::TooManySubNodes(entries.len()));
    }

    let mut writer = Vec::with_capacity(8 + entries.len() * 24);
    // btype
    writer.write_u8(0x02).expect("vec write");
    // cLevel
    writer.write_u8(0x00).expect("vec write");
    // cEnt
    writer
        .write_u16::<LittleEndian>(entries.len() as u16)
        .expect("vec write");
    // dwPadding
    writer.write_u32::<LittleEndian>(0).expect("vec write");
    // rgentries
    for entry in entries {
        writer
            .write_u64::<LittleEndian>(u64::from(u32::from(entry.nid)))
            .expect("vec write");
        entry.data.write(&mut writer).expect("vec write");
        entry.sub.write(&mut writer).expect("vec write");
    }
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_size_is_64_byte_aligned() {
        assert_eq!(block_slot_size(0), 64);
        assert_eq!(block_slot_size(48), 64);
        assert_eq!(block_slot_size(49), 128);
        assert_eq!(block_slot_size(MAX_BLOCK_DATA), 8192);
    }

    #[test]
    fn test_block_trailer_fields() {
        let bid = BlockId::new(false, 7).unwrap();
        let image = serialize_block(b"hello", bid, 0x4800).unwrap();
        assert_eq!(image.len(), 64);

        let trailer = &image[48..];
        assert_eq!(u16::from_le_bytes([trailer[0], trailer[1]]), 5);
        assert_eq!(
            u16::from_le_bytes([trailer[2], trailer[3]]),
            compute_sig(0x4800, u64::from(bid))
        );
        assert_eq!(
            u32::from_le_bytes(trailer[4..8].try_into().unwrap()),
            compute_crc(0, b"hello")
        );
        assert_eq!(
            u64::from_le_bytes(trailer[8..16].try_into().unwrap()),
            u64::from(bid)
        );
    }

    #[test]
    fn test_oversized_block_is_refused() {
        let bid = BlockId::new(false, 1).unwrap();
        let data = vec![0_u8; MAX_BLOCK_DATA + 1];
        assert!(matches!(
            serialize_block(&data, bid, 0),
            Err(NdbError::BlockDataTooLarge(_))
        ));
    }

    #[test]
    fn test_xblock_header() {
        let bids = [
            BlockId::new(false, 1).unwrap(),
            BlockId::new(false, 2).unwrap(),
        ];
        let data = xblock_data(1, 10_000, &bids);
        assert_eq!(data[0], 0x01);
        assert_eq!(data[1], 1);
        assert_eq!(u16::from_le_bytes([data[2], data[3]]), 2);
        assert_eq!(u32::from_le_bytes(data[4..8].try_into().unwrap()), 10_000);
        assert_eq!(data.len(), 8 + 16);
    }

    #[test]
    fn test_slblock_entries() {
        let entries = [SubNodeEntry {
            nid: NodeId::from(0x671),
            data: BlockId::new(false, 3).unwrap(),
            sub: BlockId::NONE,
        }];
        let data = slblock_data(&entries).unwrap();
        assert_eq!(data[0], 0x02);
        assert_eq!(u16::from_le_bytes([data[2], data[3]]), 1);
        assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 0x671);
    }
}
