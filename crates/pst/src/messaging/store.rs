//! ## [Message Store](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/aa0539bd-e7bf-4cec-8bde-0b87c2a86baf)

use std::io::{self, Read, Seek, Write};

use super::*;
use crate::ndb::{
    node_id::{NodeId, NID_MESSAGE_STORE},
    writer::NdbWriter,
};

/// The well-known folders a store's entry IDs point at.
pub(crate) struct StoreFolders {
    pub root: NodeId,
    pub ipm_subtree: NodeId,
    pub wastebasket: NodeId,
    pub finder: NodeId,
}

/// Write the message store node: a PC carrying the store identity and the
/// entry IDs of the root hierarchy.
pub(crate) fn write_store<F>(
    ndb: &mut NdbWriter<F>,
    record_key: &[u8; 16],
    display_name: &str,
    folders: &StoreFolders,
) -> io::Result<()>
where
    F: Read + Write + Seek,
{
    let mut pc = PropertyContextWriter::new();
    pc.insert(PR_RECORD_KEY, PropertyValue::Binary(record_key.to_vec()));
    pc.insert(
        PR_DISPLAY_NAME,
        PropertyValue::Unicode(display_name.to_string()),
    );
    pc.insert(
        PR_ROOT_MAILBOX,
        PropertyValue::Binary(entry_id(record_key, u32::from(folders.root))),
    );
    pc.insert(
        PR_IPM_SUBTREE_ENTRYID,
        PropertyValue::Binary(entry_id(record_key, u32::from(folders.ipm_subtree))),
    );
    pc.insert(
        PR_IPM_WASTEBASKET_ENTRYID,
        PropertyValue::Binary(entry_id(record_key, u32::from(folders.wastebasket))),
    );
    pc.insert(
        PR_FINDER_ENTRYID,
        PropertyValue::Binary(entry_id(record_key, u32::from(folders.finder))),
    );

    let (data, sub) = write_pc_node(ndb, pc)?;
    ndb.add_node(NID_MESSAGE_STORE, NID_MESSAGE_STORE, data, sub)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_store_node_is_emitted() {
        let mut ndb = NdbWriter::new(Cursor::new(Vec::new()));
        let folders = StoreFolders {
            root: NodeId::from(0x122),
            ipm_subtree: NodeId::from(0x8022),
            wastebasket: NodeId::from(0x8042),
            finder: NodeId::from(0x8062),
        };
        write_store(&mut ndb, &[0xAB; 16], "Exported Mailbox", &folders).unwrap();
        let buffer = ndb.finish([0_u32; 32]).unwrap().into_inner();

        // NBT holds exactly the store node.
        let nbt_ib = u64::from_le_bytes(buffer[224..232].try_into().unwrap()) as usize;
        let page = &buffer[nbt_ib..nbt_ib + 512];
        assert_eq!(page[488], 1);
        assert_eq!(u64::from_le_bytes(page[0..8].try_into().unwrap()), 0x21);
    }

    #[test]
    fn test_entry_id_shape() {
        let id = entry_id(&[0x11; 16], 0x122);
        assert_eq!(id.len(), 24);
        assert_eq!(&id[0..4], &[0, 0, 0, 0]);
        assert_eq!(&id[4..20], &[0x11; 16]);
        assert_eq!(u32::from_le_bytes(id[20..24].try_into().unwrap()), 0x122);
    }
}
