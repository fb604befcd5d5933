//! Top-level PST writer: owns the folder arena, NID allocation and the NDB
//! writer, and commits everything on `finish`.
//!
//! Folders are emitted in creation order, which is parent-before-child by
//! construction; messages commit immediately in submission order. A failed or
//! cancelled file-backed writer removes its output; partial PSTs are never
//! left on disk.

use std::{
    fs,
    io::{self, Read, Seek, Write},
    path::{Path, PathBuf},
};

use super::{
    folder::{write_folder, PendingFolder},
    message::write_message,
    named_prop::{NameIdMap, PropertyName},
    store::{write_store, StoreFolders},
    *,
};
use crate::ndb::{
    node_id::{NidAllocator, NodeIdType, NID_ROOT_FOLDER},
    writer::NdbWriter,
};

/// Handle to a folder created by a [`PstWriter`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FolderId(usize);

pub struct PstWriter<F>
where
    F: Read + Write + Seek,
{
    ndb: Option<NdbWriter<F>>,
    nids: NidAllocator,
    record_key: [u8; 16],
    display_name: String,
    folders: Vec<PendingFolder>,
    ipm_subtree: FolderId,
    wastebasket: FolderId,
    finder: FolderId,
    named: NameIdMap,
    cancel: CancelFlag,
    path: Option<PathBuf>,
}

impl PstWriter<fs::File> {
    /// Create a PST file on disk. The file is removed again if the writer is
    /// dropped unfinished, fails or is cancelled.
    pub fn create(
        path: impl AsRef<Path>,
        display_name: &str,
        record_key: [u8; 16],
    ) -> io::Result<Self> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let mut writer = Self::new(file, display_name, record_key)?;
        writer.path = Some(path.as_ref().to_path_buf());
        Ok(writer)
    }
}

impl<F> PstWriter<F>
where
    F: Read + Write + Seek,
{
    /// Start a PST over an arbitrary read-write-seek target, pre-creating
    /// the root hierarchy: root folder, "Top of Personal Folders" (IPM
    /// subtree), "Search Root" and "Deleted Items".
    pub fn new(file: F, display_name: &str, record_key: [u8; 16]) -> io::Result<Self> {
        let mut writer = Self {
            ndb: Some(NdbWriter::new(file)),
            nids: NidAllocator::default(),
            record_key,
            display_name: display_name.to_string(),
            folders: Vec::new(),
            ipm_subtree: FolderId(0),
            wastebasket: FolderId(0),
            finder: FolderId(0),
            named: NameIdMap::default(),
            cancel: CancelFlag::new(),
            path: None,
        };

        // The root folder is its own parent.
        writer.folders.push(PendingFolder::new(
            NID_ROOT_FOLDER,
            NID_ROOT_FOLDER,
            "",
            None,
        ));
        let root = FolderId(0);
        writer.ipm_subtree = writer.create_folder(root, "Top of Personal Folders", None)?;
        writer.finder = writer.create_folder(root, "Search Root", None)?;
        writer.wastebasket = writer.create_folder(writer.ipm_subtree, "Deleted Items", None)?;
        Ok(writer)
    }

    /// Share a cancellation flag with an embedder.
    pub fn set_cancel_flag(&mut self, cancel: CancelFlag) {
        self.cancel = cancel;
    }

    /// The "Top of Personal Folders" folder user content belongs under.
    pub fn ipm_subtree(&self) -> FolderId {
        self.ipm_subtree
    }

    pub fn wastebasket(&self) -> FolderId {
        self.wastebasket
    }

    fn check_cancel(&self) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MessagingError::Cancelled.into());
        }
        Ok(())
    }

    fn folder(&mut self, folder: FolderId) -> io::Result<&mut PendingFolder> {
        self.folders
            .get_mut(folder.0)
            .ok_or_else(|| MessagingError::UnknownFolder(folder.0).into())
    }

    /// Create a folder under `parent`, in deterministic NID order.
    pub fn create_folder(
        &mut self,
        parent: FolderId,
        name: &str,
        container_class: Option<&str>,
    ) -> io::Result<FolderId> {
        self.check_cancel()?;
        let parent_nid = self.folder(parent)?.nid;
        let nid = self.nids.allocate(NodeIdType::NormalFolder)?;

        let index = self.folders.len();
        self.folders
            .push(PendingFolder::new(nid, parent_nid, name, container_class));
        self.folder(parent)?.children.push(index);
        Ok(FolderId(index))
    }

    /// Resolve a named property to its 0x8000-range ID, assigning on first
    /// use.
    pub fn named_property(&mut self, guid: [u8; 16], name: PropertyName) -> u16 {
        self.named.get_or_assign(guid, name)
    }

    /// Write a message into `folder`, committing its node immediately.
    /// Returns the assigned NID.
    pub fn add_message(
        &mut self,
        folder: FolderId,
        message: MessageProperties,
    ) -> io::Result<u32> {
        self.check_cancel()?;
        let folder_nid = self.folder(folder)?.nid;
        let ndb = self
            .ndb
            .as_mut()
            .ok_or(MessagingError::WriterFinished)?;

        let written = write_message(ndb, &mut self.nids, folder_nid, message)?;

        let pending = self.folder(folder)?;
        pending
            .contents_rows
            .push((u32::from(written.nid), written.summary));
        pending.content_count += 1;
        if !written.is_read {
            pending.content_unread += 1;
        }
        Ok(u32::from(written.nid))
    }

    fn finalize(&mut self) -> io::Result<F> {
        self.check_cancel()?;
        let mut ndb = self
            .ndb
            .take()
            .ok_or(MessagingError::WriterFinished)?;

        // Folders, parent before child.
        for index in 0..self.folders.len() {
            let children: Vec<&PendingFolder> = self.folders[index]
                .children
                .iter()
                .map(|&child| &self.folders[child])
                .collect();
            write_folder(&mut ndb, &self.folders[index], &children)?;
        }

        write_store(
            &mut ndb,
            &self.record_key,
            &self.display_name,
            &StoreFolders {
                root: self.folders[0].nid,
                ipm_subtree: self.folders[self.ipm_subtree.0].nid,
                wastebasket: self.folders[self.wastebasket.0].nid,
                finder: self.folders[self.finder.0].nid,
            },
        )?;

        std::mem::take(&mut self.named).write(&mut ndb)?;

        ndb.finish(self.nids.counters())
    }

    /// Commit folders, store and name-to-ID map, then the NDB B-trees, maps
    /// and header. On any failure the output file is deleted.
    pub fn finish(mut self) -> io::Result<F> {
        let path = self.path.take();
        match self.finalize() {
            Ok(file) => Ok(file),
            Err(error) => {
                if let Some(path) = path {
                    let _ = fs::remove_file(path);
                }
                Err(error)
            }
        }
    }
}

impl<F> Drop for PstWriter<F>
where
    F: Read + Write + Seek,
{
    fn drop(&mut self) {
        // An unfinished file-backed writer never leaves a partial PST behind.
        if let Some(path) = self.path.take() {
            let _ = fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ltp::prop_context::PropertyValue;
    use std::io::Cursor;

    fn build_simple_pst() -> Vec<u8> {
        let mut writer =
            PstWriter::new(Cursor::new(Vec::new()), "Exported Mailbox", [0x5A; 16]).unwrap();
        let inbox = writer
            .create_folder(writer.ipm_subtree(), "Inbox", None)
            .unwrap();

        let mut message = MessageProperties::default();
        message
            .properties
            .insert(PR_SUBJECT, PropertyValue::Unicode("Hello".into()));
        message
            .properties
            .insert(PR_SENDER_NAME, PropertyValue::Unicode("A".into()));
        message.recipients.push(RecipientRow {
            recipient_type: 1,
            display_name: String::new(),
            email_address: "b@y.test".into(),
        });
        writer.add_message(inbox, message).unwrap();

        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_simple_pst_has_magic_and_nodes() {
        let buffer = build_simple_pst();
        assert_eq!(&buffer[0..4], b"!BDN");
        assert_eq!(buffer[10], 23);
        assert_eq!(buffer[513], 0);
    }

    #[test]
    fn test_deterministic_output_across_runs() {
        assert_eq!(build_simple_pst(), build_simple_pst());
    }

    #[test]
    fn test_cancelled_writer_reports_interrupted() {
        let mut writer =
            PstWriter::new(Cursor::new(Vec::new()), "Exported Mailbox", [0_u8; 16]).unwrap();
        let cancel = CancelFlag::new();
        writer.set_cancel_flag(cancel.clone());
        cancel.cancel();

        let error = writer
            .create_folder(writer.ipm_subtree(), "Inbox", None)
            .unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn test_nid_assignment_order() {
        let mut writer =
            PstWriter::new(Cursor::new(Vec::new()), "Exported Mailbox", [0_u8; 16]).unwrap();
        // Root children consumed indices 0x400..0x402; the next folder
        // continues the sequence.
        let folder = writer
            .create_folder(writer.ipm_subtree(), "Inbox", None)
            .unwrap();
        assert_eq!(writer.folders[folder.0].nid.index(), 0x403);
    }
}
