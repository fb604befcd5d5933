//! [NID (Node ID)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/18d7644e-cb33-4e11-95c0-34d8a84fbff6)

use byteorder::{LittleEndian, WriteBytesExt};
use std::{
    fmt::Debug,
    io::{self, Write},
};

use super::*;

/// `nidType`
///
/// ### See also
/// [NodeId]
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NodeIdType {
    /// `NID_TYPE_HID`: Heap node
    HeapNode = 0x00,
    /// `NID_TYPE_INTERNAL`: Internal node
    Internal = 0x01,
    /// `NID_TYPE_NORMAL_FOLDER`: Normal Folder object (PC)
    NormalFolder = 0x02,
    /// `NID_TYPE_SEARCH_FOLDER`: Search Folder object (PC)
    SearchFolder = 0x03,
    /// `NID_TYPE_NORMAL_MESSAGE`: Normal Message object (PC)
    NormalMessage = 0x04,
    /// `NID_TYPE_ATTACHMENT`: Attachment object (PC)
    Attachment = 0x05,
    /// `NID_TYPE_ASSOC_MESSAGE`: Folder associated information (FAI) Message object (PC)
    AssociatedMessage = 0x08,
    /// `NID_TYPE_HIERARCHY_TABLE`: Hierarchy table (TC)
    HierarchyTable = 0x0D,
    /// `NID_TYPE_CONTENTS_TABLE`: Contents table (TC)
    ContentsTable = 0x0E,
    /// `NID_TYPE_ASSOC_CONTENTS_TABLE`: FAI contents table (TC)
    AssociatedContentsTable = 0x0F,
    /// `NID_TYPE_ATTACHMENT_TABLE`: Attachment table (TC)
    AttachmentTable = 0x11,
    /// `NID_TYPE_RECIPIENT_TABLE`: Recipient table (TC)
    RecipientTable = 0x12,
    /// `NID_TYPE_LTP`: LTP-internal node (sub-node values)
    ListsTablesProperties = 0x1F,
}

pub const MAX_NODE_INDEX: u32 = 1_u32.rotate_right(5) - 1;

/// A 32-bit node identifier: 5 bits of type, 27 bits of index.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id_type: NodeIdType, index: u32) -> NdbResult<Self> {
        if index > MAX_NODE_INDEX {
            return Err(NdbError::InvalidNodeIndex(index));
        }

        Ok(Self((index << 5) | (id_type as u8 as u32)))
    }

    pub fn id_type(&self) -> NdbResult<NodeIdType> {
        let id_type = (self.0 & 0x1F) as u8;
        match id_type {
            0x00 => Ok(NodeIdType::HeapNode),
            0x01 => Ok(NodeIdType::Internal),
            0x02 => Ok(NodeIdType::NormalFolder),
            0x03 => Ok(NodeIdType::SearchFolder),
            0x04 => Ok(NodeIdType::NormalMessage),
            0x05 => Ok(NodeIdType::Attachment),
            0x08 => Ok(NodeIdType::AssociatedMessage),
            0x0D => Ok(NodeIdType::HierarchyTable),
            0x0E => Ok(NodeIdType::ContentsTable),
            0x0F => Ok(NodeIdType::AssociatedContentsTable),
            0x11 => Ok(NodeIdType::AttachmentTable),
            0x12 => Ok(NodeIdType::RecipientTable),
            0x1F => Ok(NodeIdType::ListsTablesProperties),
            _ => Err(NdbError::InvalidNodeIdType(id_type)),
        }
    }

    pub fn index(&self) -> u32 {
        self.0 >> 5
    }

    /// The same index under a different node type, used for the table nodes
    /// bound to a folder.
    pub fn with_type(&self, id_type: NodeIdType) -> Self {
        Self((self.0 & !0x1F) | (id_type as u8 as u32))
    }

    pub fn write(&self, f: &mut dyn Write) -> io::Result<()> {
        f.write_u32::<LittleEndian>(self.0)
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Ok(id_type) = self.id_type() else {
            return write!(f, "NodeId {{ invalid: 0x{:08X} }}", self.0);
        };
        write!(f, "NodeId {{ {:?}: 0x{:X} }}", id_type, self.index())
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<NodeId> for u32 {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

/// [`NID_MESSAGE_STORE`](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/0510ece4-6853-4bef-8cc8-8df3468e3ff1):
/// Message store node (section 2.4.3).
pub const NID_MESSAGE_STORE: NodeId = NodeId(0x21);

/// `NID_NAME_TO_ID_MAP`: Named Properties Map (section 2.4.7).
pub const NID_NAME_TO_ID_MAP: NodeId = NodeId(0x61);

/// `NID_ROOT_FOLDER`: Root Mailbox Folder object of PST.
pub const NID_ROOT_FOLDER: NodeId = NodeId(0x122);

/// `NID_SEARCH_MANAGEMENT_QUEUE`: Queue of pending search-related updates.
pub const NID_SEARCH_MANAGEMENT_QUEUE: NodeId = NodeId(0x1E1);

/// `NID_SEARCH_ACTIVITY_LIST`: Folder object NIDs with active search activity.
pub const NID_SEARCH_ACTIVITY_LIST: NodeId = NodeId(0x201);

/// Recipient table sub-node of a message, fixed by convention.
pub const NID_RECIPIENT_TABLE: NodeId = NodeId(0x692);

/// Attachment table sub-node of a message, fixed by convention.
pub const NID_ATTACHMENT_TABLE: NodeId = NodeId(0x671);

/// Starting `nidIndex` values for heap-allocated NIDs, per node type, matching
/// the `rgnid` counters a freshly created store carries.
const NID_START_INDEX: [u32; 32] = [
    0x400, 0x400, 0x400, 0x4000, 0x10000, 0x400, 0x400, 0x400, 0x8000, 0x400, 0x400, 0x400, 0x400,
    0x400, 0x400, 0x400, 0x400, 0x400, 0x400, 0x400, 0x400, 0x400, 0x400, 0x400, 0x400, 0x400,
    0x400, 0x400, 0x400, 0x400, 0x400, 0x400,
];

/// Hands out NIDs in monotonically increasing order per node-type class.
///
/// Assignment is deterministic given the allocation sequence; the final
/// counter values land in the header's `rgnid` array.
#[derive(Clone, Debug)]
pub struct NidAllocator {
    next_index: [u32; 32],
}

impl Default for NidAllocator {
    fn default() -> Self {
        Self {
            next_index: NID_START_INDEX,
        }
    }
}

impl NidAllocator {
    pub fn allocate(&mut self, id_type: NodeIdType) -> NdbResult<NodeId> {
        let slot = id_type as u8 as usize;
        let index = self.next_index[slot];
        self.next_index[slot] = index
            .checked_add(1)
            .ok_or(NdbError::InvalidNodeIndex(index))?;
        NodeId::new(id_type, index)
    }

    /// The `rgnid` header array: the next free index for every node type.
    pub fn counters(&self) -> [u32; 32] {
        let mut nids = [0_u32; 32];
        for (slot, &index) in self.next_index.iter().enumerate() {
            nids[slot] = (index << 5) | slot as u32;
        }
        nids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nid_packing() {
        let nid = NodeId::new(NodeIdType::NormalFolder, 0x9).unwrap();
        assert_eq!(u32::from(nid), 0x122);
        assert_eq!(nid.index(), 0x9);
        assert_eq!(nid.id_type().unwrap(), NodeIdType::NormalFolder);
    }

    #[test]
    fn test_nid_index_overflow() {
        let Err(NdbError::InvalidNodeIndex(value)) =
            NodeId::new(NodeIdType::HeapNode, MAX_NODE_INDEX + 1)
        else {
            panic!("NodeId should be out of range");
        };
        assert_eq!(value, MAX_NODE_INDEX + 1);
    }

    #[test]
    fn test_with_type_preserves_index() {
        let folder = NID_ROOT_FOLDER;
        let hierarchy = folder.with_type(NodeIdType::HierarchyTable);
        assert_eq!(hierarchy.index(), folder.index());
        assert_eq!(u32::from(hierarchy), 0x12D);
    }

    #[test]
    fn test_allocator_is_monotonic_per_type() {
        let mut nids = NidAllocator::default();
        let first = nids.allocate(NodeIdType::NormalMessage).unwrap();
        let second = nids.allocate(NodeIdType::NormalMessage).unwrap();
        let folder = nids.allocate(NodeIdType::NormalFolder).unwrap();
        assert_eq!(first.index(), 0x10000);
        assert_eq!(second.index(), 0x10001);
        assert_eq!(folder.index(), 0x400);
    }

    #[test]
    fn test_well_known_nid_values() {
        assert_eq!(u32::from(NID_MESSAGE_STORE), 0x21);
        assert_eq!(u32::from(NID_NAME_TO_ID_MAP), 0x61);
        assert_eq!(u32::from(NID_ROOT_FOLDER), 0x122);
        assert_eq!(u32::from(NID_SEARCH_MANAGEMENT_QUEUE), 0x1E1);
    }
}
