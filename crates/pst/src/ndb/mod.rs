//! ## [Node Database (NDB) Layer](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/e4efaad0-1876-446e-9d34-bb921588f924)

use std::io;
use thiserror::Error;

pub mod block;
pub mod block_id;
pub mod header;
pub mod node_id;
pub mod page;
pub mod writer;

use node_id::NodeId;

/// Maximum bytes of node data carried by a single block, exclusive of its
/// trailer.
pub const MAX_BLOCK_DATA: usize = 8176;

/// Pages are a fixed 512 bytes, trailer included.
pub const PAGE_SIZE: usize = 512;

/// A fresh AMap page is appended for every 253,952 bytes of grown file.
pub const AMAP_DATA_RANGE: u64 = 253_952;

/// Bytes of file space tracked by one allocation-map bit.
pub const AMAP_SLOT_SIZE: u64 = 64;

/// Hard ceiling on output size; growth past this is refused.
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum NdbError {
    #[error("Invalid nidType: 0x{0:02X}")]
    InvalidNodeIdType(u8),
    #[error("Invalid nidIndex: 0x{0:08X}")]
    InvalidNodeIndex(u32),
    #[error("Invalid bidIndex: 0x{0:016X}")]
    InvalidBlockIndex(u64),
    #[error("Block data too large: 0x{0:X}")]
    BlockDataTooLarge(usize),
    #[error("Too many sub-nodes for a single SLBLOCK: {0}")]
    TooManySubNodes(usize),
    #[error("Duplicate node in NBT: {0:?}")]
    DuplicateNode(NodeId),
    #[error("PST output would exceed 50 GiB at offset 0x{0:X}")]
    SpaceExhausted(u64),
    #[error("Readback CRC mismatch at offset 0x{0:X}")]
    ReadbackCrcMismatch(u64),
}

impl From<NdbError> for io::Error {
    fn from(err: NdbError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

pub type NdbResult<T> = Result<T, NdbError>;
