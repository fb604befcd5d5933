//! ## [Messaging Layer](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/3a64ee7a-9221-42cf-9b89-26e47f1fca90)

use std::{
    collections::BTreeMap,
    io::{self, Read, Seek, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use thiserror::Error;

pub(crate) use crate::ltp::{
    prop_context::{PropertyContextWriter, PropertyValue},
    table_context::TableContextWriter,
    LtpNodeAllocator,
};
use crate::ndb::{block_id::BlockId, writer::NdbWriter};

pub mod folder;
pub mod message;
pub mod named_prop;
pub mod store;
pub mod writer;

// Property IDs used by the writer (the tag's upper 16 bits).
pub const PR_IMPORTANCE: u16 = 0x0017;
pub const PR_MESSAGE_CLASS: u16 = 0x001A;
pub const PR_SUBJECT: u16 = 0x0037;
pub const PR_CLIENT_SUBMIT_TIME: u16 = 0x0039;
pub const PR_SENDER_NAME: u16 = 0x0C1A;
pub const PR_SENDER_ADDRTYPE: u16 = 0x0C1E;
pub const PR_SENDER_EMAIL_ADDRESS: u16 = 0x0C1F;
pub const PR_RECIPIENT_TYPE: u16 = 0x0C15;
pub const PR_DISPLAY_BCC: u16 = 0x0E02;
pub const PR_DISPLAY_CC: u16 = 0x0E03;
pub const PR_DISPLAY_TO: u16 = 0x0E04;
pub const PR_MESSAGE_DELIVERY_TIME: u16 = 0x0E06;
pub const PR_MESSAGE_FLAGS: u16 = 0x0E07;
pub const PR_MESSAGE_SIZE: u16 = 0x0E08;
pub const PR_ATTACH_SIZE: u16 = 0x0E20;
pub const PR_RECORD_KEY: u16 = 0x0FF9;
pub const PR_OBJECT_TYPE: u16 = 0x0FFE;
pub const PR_BODY: u16 = 0x1000;
pub const PR_HTML: u16 = 0x1013;
pub const PR_INTERNET_MESSAGE_ID: u16 = 0x1035;
pub const PR_ROWID: u16 = 0x3000;
pub const PR_DISPLAY_NAME: u16 = 0x3001;
pub const PR_ADDRTYPE: u16 = 0x3002;
pub const PR_EMAIL_ADDRESS: u16 = 0x3003;
pub const PR_CREATION_TIME: u16 = 0x3007;
pub const PR_LAST_MODIFICATION_TIME: u16 = 0x3008;
pub const PR_IPM_SUBTREE_ENTRYID: u16 = 0x35E0;
pub const PR_ROOT_MAILBOX: u16 = 0x35E2;
pub const PR_IPM_WASTEBASKET_ENTRYID: u16 = 0x35E3;
pub const PR_FINDER_ENTRYID: u16 = 0x35E7;
pub const PR_CONTENT_COUNT: u16 = 0x3602;
pub const PR_CONTENT_UNREAD: u16 = 0x3603;
pub const PR_SUBFOLDERS: u16 = 0x360A;
pub const PR_CONTAINER_CLASS: u16 = 0x3613;
pub const PR_ATTACH_DATA_BIN: u16 = 0x3701;
pub const PR_ATTACH_FILENAME: u16 = 0x3704;
pub const PR_ATTACH_METHOD: u16 = 0x3705;
pub const PR_ATTACH_LONG_FILENAME: u16 = 0x3707;
pub const PR_ATTACH_RENDERING_POSITION: u16 = 0x370B;
pub const PR_ATTACH_MIME_TAG: u16 = 0x370E;
pub const PR_SMTP_ADDRESS: u16 = 0x39FE;

/// `MSGFLAG_READ`
pub const MSGFLAG_READ: i32 = 0x01;
/// `MSGFLAG_HASATTACH`
pub const MSGFLAG_HASATTACH: i32 = 0x10;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Operation cancelled")]
    Cancelled,
    #[error("PST writer already finished")]
    WriterFinished,
    #[error("Unknown folder id: {0}")]
    UnknownFolder(usize),
}

impl From<MessagingError> for io::Error {
    fn from(err: MessagingError) -> io::Error {
        let kind = match err {
            MessagingError::Cancelled => io::ErrorKind::Interrupted,
            _ => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err)
    }
}

/// Cooperative cancellation signal shared with an embedder. Once raised, the
/// writer refuses further work and the output file is removed.
#[derive(Clone, Default, Debug)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One row of a message's Recipients table.
#[derive(Clone, Debug)]
pub struct RecipientRow {
    /// `PR_RECIPIENT_TYPE`: 1 = To, 2 = Cc, 3 = Bcc.
    pub recipient_type: i32,
    pub display_name: String,
    pub email_address: String,
}

/// One attachment of a message.
#[derive(Clone, Debug)]
pub struct AttachmentProperties {
    pub filename: String,
    pub long_filename: String,
    pub mime_tag: Option<String>,
    /// `PR_ATTACH_METHOD`: 1 = by-value.
    pub method: i32,
    pub data: Vec<u8>,
}

/// Everything the writer needs to emit one message.
///
/// `properties` carries the pre-tagged MAPI values (subject, sender, body,
/// timestamps, message class); the writer adds the structural properties it
/// owns (flags, size, record key).
#[derive(Clone, Default, Debug)]
pub struct MessageProperties {
    pub properties: BTreeMap<u16, PropertyValue>,
    pub recipients: Vec<RecipientRow>,
    pub attachments: Vec<AttachmentProperties>,
    pub is_read: bool,
}

/// Write a Property Context as a standalone node artifact: heap blocks become
/// the data tree, spilled values its private sub-node tree.
pub(crate) fn write_pc_node<F>(
    ndb: &mut NdbWriter<F>,
    pc: PropertyContextWriter,
) -> io::Result<(BlockId, BlockId)>
where
    F: Read + Write + Seek,
{
    let mut nodes = LtpNodeAllocator::default();
    let mut subnodes = Vec::new();
    let blocks = pc.finish(ndb, &mut nodes, &mut subnodes)?;
    let data = ndb.write_data_blocks(&blocks)?;
    let sub = if subnodes.is_empty() {
        BlockId::NONE
    } else {
        ndb.write_subnodes(&mut subnodes)?
    };
    Ok((data, sub))
}

/// Write a Table Context as a standalone node artifact.
pub(crate) fn write_tc_node<F>(
    ndb: &mut NdbWriter<F>,
    tc: TableContextWriter,
) -> io::Result<(BlockId, BlockId)>
where
    F: Read + Write + Seek,
{
    let mut nodes = LtpNodeAllocator::default();
    let mut subnodes = Vec::new();
    let blocks = tc.finish(ndb, &mut nodes, &mut subnodes)?;
    let data = ndb.write_data_blocks(&blocks)?;
    let sub = if subnodes.is_empty() {
        BlockId::NONE
    } else {
        ndb.write_subnodes(&mut subnodes)?
    };
    Ok((data, sub))
}

/// A 24-byte EntryID: four zero flag bytes, the store's record key, the NID.
pub(crate) fn entry_id(record_key: &[u8; 16], nid: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(24);
    bytes.extend_from_slice(&[0_u8; 4]);
    bytes.extend_from_slice(record_key);
    bytes.extend_from_slice(&nid.to_le_bytes());
    bytes
}

pub(crate) fn insert_if_absent(
    properties: &mut BTreeMap<u16, PropertyValue>,
    prop_id: u16,
    value: PropertyValue,
) {
    properties.entry(prop_id).or_insert(value);
}
