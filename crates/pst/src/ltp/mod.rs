//! ## [Lists, Tables, and Properties (LTP) Layer](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/4c24c7d2-5c5a-4b99-88b2-f4b84cc293ae)

use std::io;
use thiserror::Error;

pub mod heap;
pub mod prop_context;
pub mod table_context;
pub mod tree;

#[derive(Error, Debug)]
pub enum LtpError {
    #[error("Node Database error: {0}")]
    NodeDatabaseError(#[from] crate::ndb::NdbError),
    #[error("Heap allocation too large: 0x{0:X}")]
    HeapAllocTooLarge(usize),
    #[error("Too many heap blocks: 0x{0:X}")]
    TooManyHeapBlocks(usize),
    #[error("Invalid BTH record size: key 0x{0:02X}, data 0x{1:02X}")]
    InvalidTreeRecordSize(u8, u8),
    #[error("Table row value for undeclared column: 0x{0:04X}")]
    UndeclaredColumn(u16),
    #[error("Table column type mismatch on 0x{0:08X}")]
    ColumnTypeMismatch(u32),
    #[error("Too many table columns: {0}")]
    TooManyColumns(usize),
}

impl From<LtpError> for io::Error {
    fn from(err: LtpError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

pub type LtpResult<T> = Result<T, LtpError>;

/// Hands out LTP-internal NIDs (`NID_TYPE_LTP`) for values spilled into a
/// node's sub-node tree. Indices are scoped to one node.
#[derive(Debug)]
pub struct LtpNodeAllocator {
    next_index: u32,
}

impl Default for LtpNodeAllocator {
    fn default() -> Self {
        Self { next_index: 0x1 }
    }
}

impl LtpNodeAllocator {
    pub fn allocate(&mut self) -> crate::ndb::NdbResult<crate::ndb::node_id::NodeId> {
        use crate::ndb::node_id::{NodeId, NodeIdType};
        let index = self.next_index;
        self.next_index += 1;
        NodeId::new(NodeIdType::ListsTablesProperties, index)
    }
}
