//! ## [Folders](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/dee5b9d0-5513-4c5e-94aa-8bd28a9350b2)
//!
//! A folder is four artifacts sharing one NID index: the folder PC, the
//! Hierarchy TC (child folders), the Contents TC (messages) and the empty
//! Associated Contents TC.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, Write};

use super::*;
use crate::ltp::prop_context::{PTYPE_BOOLEAN, PTYPE_INTEGER32, PTYPE_TIME, PTYPE_UNICODE};
use crate::ndb::{
    node_id::{NodeId, NodeIdType},
    writer::NdbWriter,
};

/// Build a full property tag from ID and type.
pub(crate) const fn tag(prop_id: u16, prop_type: u16) -> u32 {
    ((prop_id as u32) << 16) | prop_type as u32
}

/// Columns of a Hierarchy table.
fn hierarchy_columns() -> Vec<u32> {
    vec![
        tag(PR_DISPLAY_NAME, PTYPE_UNICODE),
        tag(PR_CONTENT_COUNT, PTYPE_INTEGER32),
        tag(PR_CONTENT_UNREAD, PTYPE_INTEGER32),
        tag(PR_SUBFOLDERS, PTYPE_BOOLEAN),
        tag(PR_CONTAINER_CLASS, PTYPE_UNICODE),
    ]
}

/// Columns of a Contents table; message summary rows must stay within this
/// set.
pub(crate) fn contents_columns() -> Vec<u32> {
    vec![
        tag(PR_IMPORTANCE, PTYPE_INTEGER32),
        tag(PR_MESSAGE_CLASS, PTYPE_UNICODE),
        tag(PR_SUBJECT, PTYPE_UNICODE),
        tag(PR_CLIENT_SUBMIT_TIME, PTYPE_TIME),
        tag(PR_SENDER_NAME, PTYPE_UNICODE),
        tag(PR_DISPLAY_TO, PTYPE_UNICODE),
        tag(PR_MESSAGE_DELIVERY_TIME, PTYPE_TIME),
        tag(PR_MESSAGE_FLAGS, PTYPE_INTEGER32),
        tag(PR_MESSAGE_SIZE, PTYPE_INTEGER32),
    ]
}

/// A folder accumulating state until the writer finalizes the file.
pub(crate) struct PendingFolder {
    pub nid: NodeId,
    pub parent_nid: NodeId,
    pub name: String,
    pub container_class: Option<String>,
    pub children: Vec<usize>,
    pub content_count: i32,
    pub content_unread: i32,
    pub contents_rows: Vec<(u32, BTreeMap<u16, PropertyValue>)>,
}

impl PendingFolder {
    pub fn new(nid: NodeId, parent_nid: NodeId, name: &str, container_class: Option<&str>) -> Self {
        Self {
            nid,
            parent_nid,
            name: name.to_string(),
            container_class: container_class.map(str::to_string),
            children: Vec::new(),
            content_count: 0,
            content_unread: 0,
            contents_rows: Vec::new(),
        }
    }

    /// The values this folder contributes to its parent's Hierarchy table.
    fn hierarchy_row(&self) -> BTreeMap<u16, PropertyValue> {
        let mut values = BTreeMap::new();
        values.insert(PR_DISPLAY_NAME, PropertyValue::Unicode(self.name.clone()));
        values.insert(PR_CONTENT_COUNT, PropertyValue::Integer32(self.content_count));
        values.insert(
            PR_CONTENT_UNREAD,
            PropertyValue::Integer32(self.content_unread),
        );
        values.insert(
            PR_SUBFOLDERS,
            PropertyValue::Boolean(!self.children.is_empty()),
        );
        if let Some(class) = &self.container_class {
            values.insert(PR_CONTAINER_CLASS, PropertyValue::Unicode(class.clone()));
        }
        values
    }
}

/// Emit one folder's four nodes. `children` are the resolved child folders in
/// creation order.
pub(crate) fn write_folder<F>(
    ndb: &mut NdbWriter<F>,
    folder: &PendingFolder,
    children: &[&PendingFolder],
) -> io::Result<()>
where
    F: Read + Write + Seek,
{
    // Folder PC.
    let mut pc = PropertyContextWriter::new();
    pc.insert(PR_DISPLAY_NAME, PropertyValue::Unicode(folder.name.clone()));
    pc.insert(
        PR_CONTENT_COUNT,
        PropertyValue::Integer32(folder.content_count),
    );
    pc.insert(
        PR_CONTENT_UNREAD,
        PropertyValue::Integer32(folder.content_unread),
    );
    pc.insert(
        PR_SUBFOLDERS,
        PropertyValue::Boolean(!folder.children.is_empty()),
    );
    if let Some(class) = &folder.container_class {
        pc.insert(PR_CONTAINER_CLASS, PropertyValue::Unicode(class.clone()));
    }
    let (data, sub) = write_pc_node(ndb, pc)?;
    ndb.add_node(folder.nid, folder.parent_nid, data, sub)?;

    // Hierarchy TC.
    let mut hierarchy = TableContextWriter::new(&hierarchy_columns())?;
    for child in children {
        hierarchy.add_row(u32::from(child.nid), child.hierarchy_row())?;
    }
    let (data, sub) = write_tc_node(ndb, hierarchy)?;
    ndb.add_node(
        folder.nid.with_type(NodeIdType::HierarchyTable),
        folder.nid,
        data,
        sub,
    )?;

    // Contents TC.
    let mut contents = TableContextWriter::new(&contents_columns())?;
    for (row_id, values) in &folder.contents_rows {
        contents.add_row(*row_id, values.clone())?;
    }
    let (data, sub) = write_tc_node(ndb, contents)?;
    ndb.add_node(
        folder.nid.with_type(NodeIdType::ContentsTable),
        folder.nid,
        data,
        sub,
    )?;

    // Associated Contents TC, empty in this writer.
    let associated = TableContextWriter::new(&contents_columns())?;
    let (data, sub) = write_tc_node(ndb, associated)?;
    ndb.add_node(
        folder.nid.with_type(NodeIdType::AssociatedContentsTable),
        folder.nid,
        data,
        sub,
    )?;

    Ok(())
}
