//! [Pages](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/5774b4f2-cdc4-453e-996a-8c8230116930)
//!
//! Every page is 512 bytes ending in a 16-byte trailer. Byte-image builders
//! live here; on-disk placement belongs to [`writer`](super::writer).

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Cursor, Write};

use super::*;
use crate::{block_sig::compute_sig, crc::compute_crc};

/// Bytes of page content in front of the trailer.
pub const PAGE_DATA_SIZE: usize = PAGE_SIZE - 16;

/// Bytes of B-tree entry storage on a BTPAGE (`rgentries`).
pub const BTPAGE_ENTRY_SPACE: usize = 488;

/// `ptype`
///
/// ### See also
/// [PageTrailer](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/f4ccb38a-930a-4db4-98df-a69c195926ba)
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PageType {
    /// `ptypeBBT`: Block BTree page
    BlockBTree = 0x80,
    /// `ptypeNBT`: Node BTree page
    NodeBTree = 0x81,
    /// `ptypeFMap`: Free Map page (legacy)
    FreeMap = 0x82,
    /// `ptypePMap`: Allocation Page Map page (unused)
    AllocationPageMap = 0x83,
    /// `ptypeAMap`: Allocation Map page
    AllocationMap = 0x84,
    /// `ptypeFPMap`: Free Page Map page (legacy, ANSI)
    FreePageMap = 0x85,
    /// `ptypeDL`: Density List page
    DensityList = 0x86,
}

impl PageType {
    /// AMap-family pages carry a zero signature; B-tree and Density List
    /// pages compute one from (ib, bid).
    fn has_signature(self) -> bool {
        matches!(
            self,
            PageType::BlockBTree | PageType::NodeBTree | PageType::DensityList
        )
    }
}

/// Serialize a 512-byte page: 496 bytes of content plus the trailer.
pub fn serialize_page(content: &[u8], page_type: PageType, bid: u64, ib: u64) -> Vec<u8> {
    debug_assert_eq!(content.len(), PAGE_DATA_SIZE);

    let mut image = Vec::with_capacity(PAGE_SIZE);
    image.extend_from_slice(content);

    let sig = if page_type.has_signature() {
        compute_sig(ib, bid)
    } else {
        0
    };

    // ptype, ptypeRepeat
    image.push(page_type as u8);
    image.push(page_type as u8);
    // wSig
    image.extend_from_slice(&sig.to_le_bytes());
    // dwCRC
    image.extend_from_slice(&compute_crc(0, content).to_le_bytes());
    // bid
    image.extend_from_slice(&bid.to_le_bytes());

    image
}

/// Build the content of a
/// [BTPAGE](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/4f0cd8e7-c2d0-4975-90a4-d417cfca77f8).
///
/// `entries` are pre-serialized, key-ordered and of uniform `entry_size`.
pub fn btpage_content(entries: &[Vec<u8>], entry_size: u8, level: u8) -> Vec<u8> {
    let max_entries = BTPAGE_ENTRY_SPACE / entry_size as usize;
    debug_assert!(entries.len() <= max_entries);

    let mut cursor = Cursor::new(vec![0_u8; PAGE_DATA_SIZE]);
    // rgentries
    for entry in entries {
        debug_assert_eq!(entry.len(), entry_size as usize);
        cursor.write_all(entry).expect("vec write");
    }
    cursor.set_position(BTPAGE_ENTRY_SPACE as u64);
    // cEnt
    cursor.write_u8(entries.len() as u8).expect("vec write");
    // cEntMax
    cursor.write_u8(max_entries as u8).expect("vec write");
    // cbEnt
    cursor.write_u8(entry_size).expect("vec write");
    // cLevel
    cursor.write_u8(level).expect("vec write");
    // dwPadding
    cursor.write_u32::<LittleEndian>(0).expect("vec write");

    cursor.into_inner()
}

/// A (key, BREF) reference to a B-tree page one level down, the
/// [BTENTRY](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/bc8052a3-f300-4022-be31-f0f408fffca0)
/// of intermediate pages.
#[derive(Clone, Copy, Debug)]
pub struct BTreePageRef {
    pub key: u64,
    pub bid: u64,
    pub ib: u64,
}

impl BTreePageRef {
    pub fn serialize(&self) -> Vec<u8> {
        let mut entry = Vec::with_capacity(24);
        entry.extend_from_slice(&self.key.to_le_bytes());
        entry.extend_from_slice(&self.bid.to_le_bytes());
        entry.extend_from_slice(&self.ib.to_le_bytes());
        entry
    }
}

/// Build the content of an AMap page from its 496-byte bitmap.
pub fn amap_content(bitmap: &[u8; PAGE_DATA_SIZE]) -> Vec<u8> {
    bitmap.to_vec()
}

/// PMap pages are unused; content stays zero-filled.
pub fn pmap_content() -> Vec<u8> {
    vec![0_u8; PAGE_DATA_SIZE]
}

/// An empty
/// [DLISTPAGE](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/9d3c45b9-a415-446c-954b-b1f610ca5bf1):
/// readers rebuild density information on demand.
pub fn dlist_content() -> Vec<u8> {
    vec![0_u8; PAGE_DATA_SIZE]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_is_512_bytes_with_repeated_type() {
        let image = serialize_page(&[0_u8; PAGE_DATA_SIZE], PageType::AllocationMap, 0x11, 0x4400);
        assert_eq!(image.len(), PAGE_SIZE);
        assert_eq!(image[496], 0x84);
        assert_eq!(image[497], 0x84);
        // AMap pages carry no signature.
        assert_eq!(u16::from_le_bytes([image[498], image[499]]), 0);
        assert_eq!(
            u64::from_le_bytes(image[504..512].try_into().unwrap()),
            0x11
        );
    }

    #[test]
    fn test_btree_page_signature_and_crc() {
        let content = btpage_content(&[], 24, 0);
        let image = serialize_page(&content, PageType::BlockBTree, 0x21, 0x4800);
        assert_eq!(
            u16::from_le_bytes([image[498], image[499]]),
            compute_sig(0x4800, 0x21)
        );
        assert_eq!(
            u32::from_le_bytes(image[500..504].try_into().unwrap()),
            compute_crc(0, &content)
        );
    }

    #[test]
    fn test_btpage_metadata() {
        let entries = vec![vec![0xAA_u8; 32], vec![0xBB_u8; 32]];
        let content = btpage_content(&entries, 32, 0);
        assert_eq!(content.len(), PAGE_DATA_SIZE);
        assert_eq!(content[488], 2); // cEnt
        assert_eq!(content[489], 15); // cEntMax for 32-byte entries
        assert_eq!(content[490], 32); // cbEnt
        assert_eq!(content[491], 0); // cLevel
        assert_eq!(&content[..32], &[0xAA_u8; 32][..]);
    }
}
