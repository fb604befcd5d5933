//! [HEADER](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/c9876f5a-664b-46a3-9887-ba63f113abf5)

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Cursor, Write};

use crate::crc::compute_crc;

/// `dwMagic`: `!BDN` read little-endian.
const HEADER_MAGIC: u32 = u32::from_be_bytes(*b"NDB!");

const HEADER_MAGIC_CLIENT: u16 = u16::from_be_bytes(*b"MS");

/// `wVer` for a Unicode PST.
const NDB_VERSION_UNICODE: u16 = 23;

const NDB_CLIENT_VERSION: u16 = 19;
const NDB_PLATFORM_CREATE: u8 = 0x01;
const NDB_PLATFORM_ACCESS: u8 = 0x01;
const NDB_SENTINEL: u8 = 0x80;

/// `bCryptMethod = NDB_CRYPT_NONE`: data blocks are not encoded.
const NDB_CRYPT_NONE: u8 = 0x00;

/// `fAMapValid = VALID_AMAP2`
const AMAP_VALID: u8 = 0x02;

/// A [BREF](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/844a5ebf-488a-45fd-8fce-92a84d8e24a3):
/// block/page ID paired with its absolute byte offset.
#[derive(Clone, Copy, Default, Debug)]
pub struct PageRef {
    pub bid: u64,
    pub ib: u64,
}

impl PageRef {
    fn write(&self, f: &mut dyn Write) -> io::Result<()> {
        f.write_u64::<LittleEndian>(self.bid)?;
        f.write_u64::<LittleEndian>(self.ib)
    }
}

/// The [ROOT](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/32ce8c94-4757-46c8-a169-3fd21abee584)
/// record: file extents, allocation totals and B-tree roots.
#[derive(Clone, Copy, Default, Debug)]
pub struct Root {
    pub file_eof: u64,
    pub amap_last: u64,
    pub amap_free: u64,
    pub node_btree: PageRef,
    pub block_btree: PageRef,
}

impl Root {
    fn write(&self, f: &mut dyn Write) -> io::Result<()> {
        // dwReserved
        f.write_u32::<LittleEndian>(0)?;
        // ibFileEof
        f.write_u64::<LittleEndian>(self.file_eof)?;
        // ibAMapLast
        f.write_u64::<LittleEndian>(self.amap_last)?;
        // cbAMapFree
        f.write_u64::<LittleEndian>(self.amap_free)?;
        // cbPMapFree
        f.write_u64::<LittleEndian>(0)?;
        // BREFNBT
        self.node_btree.write(f)?;
        // BREFBBT
        self.block_btree.write(f)?;
        // fAMapValid
        f.write_u8(AMAP_VALID)?;
        // bReserved
        f.write_u8(0)?;
        // wReserved
        f.write_u16::<LittleEndian>(0)
    }
}

/// The fixed 564-byte Unicode PST header.
#[derive(Clone, Debug)]
pub struct Header {
    pub next_page: u64,
    pub next_block: u64,
    pub unique: u32,
    pub nids: [u32; 32],
    pub root: Root,
}

impl Header {
    /// Serialize the header, computing `dwCRCPartial` over the first 471
    /// post-magic bytes and `dwCRCFull` over all 516.
    pub fn write(&self, f: &mut dyn Write) -> io::Result<()> {
        let mut cursor = Cursor::new([0_u8; 516]);
        // wMagicClient
        cursor.write_u16::<LittleEndian>(HEADER_MAGIC_CLIENT)?;
        // wVer
        cursor.write_u16::<LittleEndian>(NDB_VERSION_UNICODE)?;
        // wVerClient
        cursor.write_u16::<LittleEndian>(NDB_CLIENT_VERSION)?;
        // bPlatformCreate
        cursor.write_u8(NDB_PLATFORM_CREATE)?;
        // bPlatformAccess
        cursor.write_u8(NDB_PLATFORM_ACCESS)?;
        // dwReserved1
        cursor.write_u32::<LittleEndian>(0)?;
        // dwReserved2
        cursor.write_u32::<LittleEndian>(0)?;
        // bidUnused
        cursor.write_u64::<LittleEndian>(0)?;
        // bidNextP
        cursor.write_u64::<LittleEndian>(self.next_page)?;
        // dwUnique
        cursor.write_u32::<LittleEndian>(self.unique)?;
        // rgnid
        for nid in self.nids.iter() {
            cursor.write_u32::<LittleEndian>(*nid)?;
        }
        // qwUnused
        cursor.write_u64::<LittleEndian>(0)?;
        // root
        self.root.write(&mut cursor)?;
        // dwAlign
        cursor.write_u32::<LittleEndian>(0)?;
        // rgbFM
        cursor.write_all(&[0xFF; 128])?;
        // rgbFP
        cursor.write_all(&[0xFF; 128])?;
        // bSentinel
        cursor.write_u8(NDB_SENTINEL)?;
        // bCryptMethod
        cursor.write_u8(NDB_CRYPT_NONE)?;
        // rgbReserved
        cursor.write_u16::<LittleEndian>(0)?;
        // bidNextB
        cursor.write_u64::<LittleEndian>(self.next_block)?;

        let crc_data = cursor.into_inner();
        let crc_partial = compute_crc(0, &crc_data[..471]);
        let crc_full = compute_crc(0, &crc_data);

        // dwMagic
        f.write_u32::<LittleEndian>(HEADER_MAGIC)?;
        // dwCRCPartial
        f.write_u32::<LittleEndian>(crc_partial)?;

        f.write_all(&crc_data)?;

        // dwCRCFull
        f.write_u32::<LittleEndian>(crc_full)?;

        // rgbReserved2, bReserved, rgbReserved3 (total 36 bytes)
        f.write_all(&[0_u8; 36])
    }
}
