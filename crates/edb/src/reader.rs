//! Assembles typed records from the partitioned mailbox tables of an
//! Exchange database (`Mailbox`, `Folder_XXX`, `Message_XXX`,
//! `Attachment_XXX`).

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, warn};

use crate::blob;
use crate::error::{Diagnostics, EdbError, ErrorContext, Result};
use crate::ese::{EseDatabase, EseTable, RowAdapter};
use crate::model::*;
use crate::strings;

/// Tags whose leading byte marks an Exchange-compressed column.
fn looks_compressed(bytes: &[u8]) -> bool {
    matches!(bytes.first(), Some(0x10 | 0x12 | 0x15 | 0x17 | 0x18 | 0x19))
}

/// Reader over one open database; owns nothing but the backend handle.
pub struct EdbReader<'a> {
    database: &'a dyn EseDatabase,
    table_names: Vec<String>,
}

/// The folder arena of one mailbox, with a children map built in one pass.
pub struct FolderTree {
    pub folders: Vec<Folder>,
    pub children: BTreeMap<FolderIndex, Vec<FolderIndex>>,
    orphan: Option<FolderIndex>,
}

impl FolderTree {
    fn new(folders: Vec<Folder>) -> Self {
        let mut children: BTreeMap<FolderIndex, Vec<FolderIndex>> = BTreeMap::new();
        for (index, folder) in folders.iter().enumerate() {
            if folder.parent_id == folder.folder_id {
                continue;
            }
            if let Some(parent) = folders
                .iter()
                .position(|candidate| candidate.folder_id == folder.parent_id)
            {
                children.entry(parent).or_default().push(index);
            }
        }
        Self {
            folders,
            children,
            orphan: None,
        }
    }

    pub fn index_of(&self, folder_id: &[u8]) -> Option<FolderIndex> {
        self.folders
            .iter()
            .position(|folder| folder.folder_id == folder_id)
    }

    /// Folders with no resolvable parent, in table order.
    pub fn roots(&self) -> Vec<FolderIndex> {
        self.folders
            .iter()
            .enumerate()
            .filter(|(_, folder)| {
                folder.parent_id == folder.folder_id
                    || self
                        .folders
                        .iter()
                        .all(|candidate| candidate.folder_id != folder.parent_id)
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Indices in parent-before-child topological order.
    pub fn topological(&self) -> Vec<FolderIndex> {
        let mut order = Vec::with_capacity(self.folders.len());
        let mut stack: Vec<FolderIndex> = self.roots();
        stack.reverse();
        while let Some(index) = stack.pop() {
            order.push(index);
            if let Some(children) = self.children.get(&index) {
                for &child in children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        order
    }

    /// Route a message to its folder, synthesizing "Orphaned" for unmatched
    /// folder IDs rather than dropping the message.
    pub fn route(&mut self, folder_id: &[u8]) -> FolderIndex {
        if let Some(index) = self.index_of(folder_id) {
            return index;
        }
        if let Some(orphan) = self.orphan {
            return orphan;
        }
        let index = self.folders.len();
        self.folders.push(Folder {
            folder_id: folder_id.to_vec(),
            parent_id: folder_id.to_vec(),
            display_name: "Orphaned".to_string(),
            special: None,
            message_count: 0,
        });
        self.orphan = Some(index);
        index
    }
}

impl<'a> EdbReader<'a> {
    pub fn new(database: &'a dyn EseDatabase) -> Self {
        let table_names = database.table_names();
        debug!(tables = table_names.len(), "cached table map");
        Self {
            database,
            table_names,
        }
    }

    pub fn table_names(&self) -> &[String] {
        &self.table_names
    }

    /// Message table names, one per mailbox partition.
    pub fn message_tables(&self) -> Vec<&String> {
        self.table_names
            .iter()
            .filter(|name| {
                name.strip_prefix("Message_")
                    .is_some_and(|suffix| suffix.bytes().all(|b| b.is_ascii_digit()))
            })
            .collect()
    }

    fn table(&self, name: &str) -> Result<&dyn EseTable> {
        self.database
            .table(name)
            .ok_or_else(|| EdbError::MalformedDatabase {
                path: Default::default(),
                reason: format!("table {name} not found"),
            })
    }

    /// Mailboxes listed in the `Mailbox` table.
    pub fn mailboxes(&self, diagnostics: &mut Diagnostics) -> Vec<Mailbox> {
        let Ok(table) = self.table("Mailbox") else {
            warn!("Mailbox table not found");
            return Vec::new();
        };

        let mut mailboxes = Vec::new();
        for index in 0..table.row_count() {
            let Some(adapter) = RowAdapter::new(table, "Mailbox", index) else {
                continue;
            };
            match self.parse_mailbox(&adapter) {
                Ok(Some(mailbox)) => mailboxes.push(mailbox),
                Ok(None) => {}
                Err(error) => diagnostics.record(&error),
            }
        }
        mailboxes
    }

    fn parse_mailbox(&self, adapter: &RowAdapter<'_>) -> Result<Option<Mailbox>> {
        let Some(mailbox_number) = adapter.integer("MailboxNumber")? else {
            return Ok(None);
        };
        let owner = adapter
            .string("DisplayName")?
            .map(|decoded| decoded.text)
            .unwrap_or_default();
        Ok(Some(Mailbox {
            mailbox_number,
            guid: adapter.bytes("MailboxGuid")?.unwrap_or_default(),
            owner_display_name: owner,
            message_count: adapter.integer("MessageCount")?.unwrap_or(0),
            last_logon: adapter.filetime("LastLogonTime")?,
        }))
    }

    /// The folder arena of one mailbox.
    pub fn folders(&self, mailbox_number: u64, diagnostics: &mut Diagnostics) -> Result<FolderTree> {
        let table_name = format!("Folder_{mailbox_number}");
        let table = self.table(&table_name)?;

        let mut folders = Vec::new();
        for index in 0..table.row_count() {
            let Some(adapter) = RowAdapter::new(table, &table_name, index) else {
                continue;
            };
            match self.parse_folder(&adapter) {
                Ok(Some(folder)) => folders.push(folder),
                Ok(None) => {}
                Err(error) => diagnostics.record(&error),
            }
        }
        Ok(FolderTree::new(folders))
    }

    fn parse_folder(&self, adapter: &RowAdapter<'_>) -> Result<Option<Folder>> {
        let Some(folder_id) = adapter.bytes("FolderId")? else {
            return Ok(None);
        };
        let special = adapter
            .integer("SpecialFolderNumber")?
            .and_then(SpecialFolder::from_number);

        let display_name = match adapter.string("DisplayName")? {
            Some(decoded) if !decoded.text.is_empty() => decoded.text,
            _ => special
                .map(|special| special.display_name().to_string())
                .unwrap_or_else(|| format!("Folder_{}", short_id(&folder_id))),
        };

        Ok(Some(Folder {
            parent_id: adapter.bytes("ParentFolderId")?.unwrap_or_else(|| folder_id.clone()),
            folder_id,
            display_name,
            special,
            message_count: adapter.integer("MessageCount")?.unwrap_or(0),
        }))
    }

    /// Detect Exchange 2016+ content encryption: a readable database has an
    /// `IPM.`-prefixed MessageClass in its first message row.
    pub fn detect_encryption(&self) -> Option<String> {
        for table_name in self.message_tables() {
            let Ok(table) = self.table(table_name) else {
                continue;
            };
            let Some(adapter) = RowAdapter::new(table, table_name, 0) else {
                continue;
            };
            let Ok(Some(bytes)) = adapter.bytes("MessageClass") else {
                continue;
            };
            let text = decode_message_class(&bytes);
            if text.starts_with("IPM.") || text.starts_with("REPORT.IPM.") {
                return None;
            }
            return Some(
                "database content appears to be encrypted (Exchange 2016+); only metadata \
                 is extractable"
                    .to_string(),
            );
        }
        None
    }

    /// A pull-based cursor over one mailbox's messages in ascending
    /// MessageDocumentId order.
    pub fn messages<'r, 'd>(
        &'r self,
        mailbox_number: u64,
        diagnostics: &'d mut Diagnostics,
    ) -> Result<MessageCursor<'r, 'a, 'd>> {
        let table_name = format!("Message_{mailbox_number}");
        let table = self.table(&table_name)?;

        let mut order: Vec<(u64, usize)> = Vec::with_capacity(table.row_count());
        for index in 0..table.row_count() {
            let doc_id = RowAdapter::new(table, &table_name, index)
                .and_then(|adapter| adapter.integer("MessageDocumentId").ok().flatten())
                .unwrap_or(index as u64);
            order.push((doc_id, index));
        }
        order.sort();

        Ok(MessageCursor {
            reader: self,
            table,
            table_name,
            order,
            position: 0,
            diagnostics,
        })
    }

    /// Decompress a column value that may carry an Exchange compression tag.
    fn decompressed(
        &self,
        bytes: Vec<u8>,
        context: ErrorContext,
    ) -> Result<Vec<u8>> {
        if !looks_compressed(&bytes) {
            return Ok(bytes);
        }
        match ese_xpress::decompress(&bytes) {
            Ok(result) => Ok(result.data),
            Err(ese_xpress::XpressError::Unsupported(tag)) => {
                Err(EdbError::UnsupportedColumnType { tag, context })
            }
            Err(error) => Err(EdbError::DecompressionFailed {
                context,
                reason: error.to_string(),
            }),
        }
    }

    fn assemble_message(
        &self,
        adapter: &RowAdapter<'_>,
        table_name: &str,
        record_index: usize,
        diagnostics: &mut Diagnostics,
    ) -> EmailMessage {
        let mut email = EmailMessage {
            record_index,
            ..Default::default()
        };

        let mut recover = |result: Result<()>, diagnostics: &mut Diagnostics| {
            if let Err(error) = result {
                diagnostics.record(&error);
            }
        };

        // MessageClass first; it drives downstream classification.
        let class = self.text_column(adapter, table_name, record_index, "MessageClass");
        recover(
            class.map(|text| {
                email.message_class = text;
            }),
            diagnostics,
        );

        // Sender, subject and Message-ID from the PropertyBlob.
        let blob_info = self
            .blob_column(adapter, table_name, record_index, "PropertyBlob")
            .map(|bytes| blob::parse_property_blob(&bytes));
        recover(
            blob_info.map(|info| {
                email.sender_name = info.sender_name;
                email.sender_email = info.sender_email;
                email.subject = info.subject;
                email.message_id = info.message_id;
            }),
            diagnostics,
        );

        // Recipients: DisplayTo/Cc/Bcc joined against the RecipientList map.
        let recipient_map = self
            .blob_column(adapter, table_name, record_index, "RecipientList")
            .map(|bytes| blob::parse_recipient_list(&bytes))
            .unwrap_or_default();
        for (column, bucket) in [
            ("DisplayTo", 0_usize),
            ("DisplayCc", 1),
            ("DisplayBcc", 2),
        ] {
            let display = self.text_column(adapter, table_name, record_index, column);
            recover(
                display.map(|text| {
                    let matched = blob::match_recipients(&text, &recipient_map);
                    let list = matched
                        .into_iter()
                        .map(|(name, email)| EmailAddress { name, email })
                        .collect();
                    match bucket {
                        0 => email.recipients_to = list,
                        1 => email.recipients_cc = list,
                        _ => email.recipients_bcc = list,
                    }
                }),
                diagnostics,
            );
        }

        // Dates and flag columns.
        recover(
            adapter.filetime("DateSent").map(|value| {
                email.date_sent = value;
            }),
            diagnostics,
        );
        recover(
            adapter.filetime("DateReceived").map(|value| {
                email.date_received = value;
            }),
            diagnostics,
        );
        recover(
            adapter.boolean("IsRead").map(|value| {
                email.is_read = value;
            }),
            diagnostics,
        );
        recover(
            adapter.boolean("IsHidden").map(|value| {
                email.is_hidden = value;
            }),
            diagnostics,
        );
        recover(
            adapter.integer("Importance").map(|value| {
                email.importance = value.map(Importance::from_value).unwrap_or_default();
            }),
            diagnostics,
        );
        recover(
            adapter.bytes("FolderId").map(|value| {
                email.folder_id = value.unwrap_or_default();
            }),
            diagnostics,
        );

        // Body: NativeBody carries a 7-byte compression header.
        recover(
            adapter.bytes("NativeBody").map(|value| {
                if let Some(bytes) = value {
                    let decoded = decode_native_body(&bytes);
                    email.decode_replacements += decoded.replacements;
                    if decoded.text.trim_start().starts_with('<') {
                        email.body_html = decoded.text;
                        email.body_text = String::new();
                    } else {
                        email.body_text = decoded.text;
                    }
                }
            }),
            diagnostics,
        );

        // Attachment stubs from the SubobjectsBlob inids; data stays lazy.
        let subobjects = self.blob_column(adapter, table_name, record_index, "SubobjectsBlob");
        recover(
            subobjects.map(|bytes| {
                for inid in parse_subobject_inids(&bytes) {
                    email.attachments.push(Attachment {
                        inid: Some(inid),
                        ..Default::default()
                    });
                }
            }),
            diagnostics,
        );

        email
    }

    /// A decompressed blob column; absent columns yield an empty buffer.
    fn blob_column(
        &self,
        adapter: &RowAdapter<'_>,
        table_name: &str,
        row: usize,
        column: &str,
    ) -> Result<Vec<u8>> {
        let Some(bytes) = adapter.bytes(column)? else {
            return Ok(Vec::new());
        };
        self.decompressed(bytes, ErrorContext::column(table_name, row, column))
    }

    /// A decompressed, decoded text column.
    fn text_column(
        &self,
        adapter: &RowAdapter<'_>,
        table_name: &str,
        row: usize,
        column: &str,
    ) -> Result<String> {
        let bytes = self.blob_column(adapter, table_name, row, column)?;
        if bytes.is_empty() {
            return Ok(String::new());
        }
        Ok(strings::decode_exchange_string(&bytes).text)
    }

    /// Fill in attachment metadata and content from the `Attachment_XXX`
    /// table. Safe to call repeatedly; the data read is idempotent.
    pub fn load_attachment(
        &self,
        mailbox_number: u64,
        attachment: &mut Attachment,
    ) -> Result<()> {
        if attachment.data.is_some() {
            return Ok(());
        }
        let Some(inid) = attachment.inid else {
            attachment.data = Some(Vec::new());
            return Ok(());
        };

        let table_name = format!("Attachment_{mailbox_number}");
        let table = self.table(&table_name)?;
        for index in 0..table.row_count() {
            let Some(adapter) = RowAdapter::new(table, &table_name, index) else {
                continue;
            };
            if adapter.integer("Inid")? != Some(inid as u64) {
                continue;
            }

            if let Some(decoded) = adapter.string("Name")? {
                attachment.filename = decoded.text;
            }
            if let Some(decoded) = adapter.string("ContentType")? {
                if !decoded.text.is_empty() {
                    attachment.content_type = Some(decoded.text);
                }
            }
            let data = adapter.bytes("Content")?.unwrap_or_default();
            attachment.size = adapter.integer("Size")?.unwrap_or(data.len() as u64);
            attachment.data = Some(data);
            return Ok(());
        }

        Err(EdbError::LongValueMissing {
            lv_id: inid,
            context: ErrorContext::table(table_name),
        })
    }
}

/// Message iteration checkpoint: the last produced (folder, document) pair.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Checkpoint {
    pub folder_id: Vec<u8>,
    pub doc_id: u64,
}

/// Pull-based message cursor; each yield is a stable checkpoint.
pub struct MessageCursor<'r, 'a, 'd> {
    reader: &'r EdbReader<'a>,
    table: &'r dyn EseTable,
    table_name: String,
    order: Vec<(u64, usize)>,
    position: usize,
    diagnostics: &'d mut Diagnostics,
}

impl MessageCursor<'_, '_, '_> {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Restart after a saved checkpoint: the next message produced is the
    /// first with a document ID above it.
    pub fn seek(&mut self, checkpoint: &Checkpoint) {
        self.position = self
            .order
            .partition_point(|(doc_id, _)| *doc_id <= checkpoint.doc_id);
    }
}

impl Iterator for MessageCursor<'_, '_, '_> {
    type Item = (u64, EmailMessage);

    fn next(&mut self) -> Option<Self::Item> {
        let (doc_id, row_index) = *self.order.get(self.position)?;
        self.position += 1;

        let email = match RowAdapter::new(self.table, &self.table_name, row_index) {
            Some(adapter) => {
                let email = self.reader.assemble_message(
                    &adapter,
                    &self.table_name,
                    row_index,
                    self.diagnostics,
                );
                self.diagnostics.replacement_chars += email.decode_replacements;
                email
            }
            None => EmailMessage {
                record_index: row_index,
                ..Default::default()
            },
        };
        Some((doc_id, email))
    }
}

/// `0x21 + Inid` markers inside a SubobjectsBlob.
fn parse_subobject_inids(blob: &[u8]) -> Vec<u32> {
    let mut inids = Vec::new();
    let mut index = 0;
    while index + 5 <= blob.len() {
        if blob[index] == 0x21 {
            let inid = LittleEndian::read_u32(&blob[index + 1..index + 5]);
            if inid != 0 && !inids.contains(&inid) {
                inids.push(inid);
            }
            index += 5;
        } else {
            index += 1;
        }
    }
    inids
}

/// NativeBody: compression tag, 2-byte uncompressed size, 4 reserved bytes,
/// then the LZXPRESS stream. Uncompressed tags fall through to the generic
/// column decoder.
fn decode_native_body(bytes: &[u8]) -> strings::Decoded {
    if bytes.len() > 7 && matches!(bytes[0], 0x18 | 0x19) {
        let size = LittleEndian::read_u16(&bytes[1..3]) as usize;
        if let Ok(decompressed) = ese_xpress::decompress_lz77(&bytes[7..], size) {
            return strings::decode_legacy_body(&decompressed);
        }
        // Damaged stream: fall back to whatever follows the header.
        return strings::decode_legacy_body(&bytes[7..]);
    }

    if looks_compressed(bytes) {
        if let Ok(result) = ese_xpress::decompress(bytes) {
            return strings::decode_legacy_body(&result.data);
        }
    }
    strings::decode_legacy_body(bytes)
}

fn decode_message_class(bytes: &[u8]) -> String {
    if looks_compressed(bytes) {
        if let Ok(result) = ese_xpress::decompress(bytes) {
            return strings::decode_exchange_string(&result.data).text;
        }
    }
    strings::decode_exchange_string(bytes).text
}

fn short_id(folder_id: &[u8]) -> String {
    let hex: String = folder_id.iter().map(|byte| format!("{byte:02x}")).collect();
    let start = hex.len().saturating_sub(8);
    hex[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ese::{MemoryDatabase, MemoryTable, MemoryValue};

    fn value(bytes: &[u8]) -> MemoryValue {
        MemoryValue {
            hex: bytes.to_vec(),
            lv: false,
        }
    }

    fn utf16(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    fn sample_database() -> MemoryDatabase {
        let mut database = MemoryDatabase::default();

        let mut mailbox_row = BTreeMap::new();
        mailbox_row.insert("MailboxNumber".into(), value(&103_u32.to_le_bytes()));
        mailbox_row.insert("MailboxGuid".into(), value(&[0xAB; 16]));
        mailbox_row.insert("MessageCount".into(), value(&2_u32.to_le_bytes()));
        mailbox_row.insert("DisplayName".into(), value(&utf16("Administrator")));
        database.tables.insert(
            "Mailbox".into(),
            MemoryTable {
                rows: vec![mailbox_row],
                ..Default::default()
            },
        );

        let inbox_id = [0x0C_u8; 26];
        let root_id = [0x01_u8; 26];
        let mut root_row = BTreeMap::new();
        root_row.insert("FolderId".into(), value(&root_id));
        root_row.insert("ParentFolderId".into(), value(&root_id));
        root_row.insert("SpecialFolderNumber".into(), value(&[9]));
        let mut inbox_row = BTreeMap::new();
        inbox_row.insert("FolderId".into(), value(&inbox_id));
        inbox_row.insert("ParentFolderId".into(), value(&root_id));
        inbox_row.insert("SpecialFolderNumber".into(), value(&[10]));
        inbox_row.insert("DisplayName".into(), value(&utf16("Inbox")));
        database.tables.insert(
            "Folder_103".into(),
            MemoryTable {
                rows: vec![root_row, inbox_row],
                ..Default::default()
            },
        );

        let mut message_row = BTreeMap::new();
        message_row.insert("MessageDocumentId".into(), value(&7_u32.to_le_bytes()));
        message_row.insert("FolderId".into(), value(&inbox_id));
        message_row.insert("MessageClass".into(), value(&utf16("IPM.Note")));
        message_row.insert("IsRead".into(), value(&[1]));
        message_row.insert(
            "PropertyBlob".into(),
            value(b"\x01JOHN DOEM\x06Hi all\x00M\x10john@lab.example"),
        );
        message_row.insert("DisplayTo".into(), value(&utf16("Jane Roe")));
        message_row.insert(
            "RecipientList".into(),
            value(b"ProP\x01JANE ROEM\x08Jane RoeEXM\x10jane@example.com"),
        );
        message_row.insert(
            "DateReceived".into(),
            value(&131_000_000_000_000_000_u64.to_le_bytes()),
        );
        message_row.insert("SubobjectsBlob".into(), value(&[0x21, 5, 0, 0, 0]));
        database.tables.insert(
            "Message_103".into(),
            MemoryTable {
                rows: vec![message_row],
                ..Default::default()
            },
        );

        let mut attachment_row = BTreeMap::new();
        attachment_row.insert("Inid".into(), value(&5_u32.to_le_bytes()));
        attachment_row.insert("Name".into(), value(&utf16("notes.txt")));
        attachment_row.insert("ContentType".into(), value(&utf16("text/plain")));
        attachment_row.insert("Content".into(), value(b"attached bytes"));
        database.tables.insert(
            "Attachment_103".into(),
            MemoryTable {
                rows: vec![attachment_row],
                ..Default::default()
            },
        );

        database
    }

    #[test]
    fn test_mailboxes_and_folders() {
        let database = sample_database();
        let reader = EdbReader::new(&database);
        let mut diagnostics = Diagnostics::new();

        let mailboxes = reader.mailboxes(&mut diagnostics);
        assert_eq!(mailboxes.len(), 1);
        assert_eq!(mailboxes[0].mailbox_number, 103);
        assert_eq!(mailboxes[0].owner_display_name, "Administrator");

        let tree = reader.folders(103, &mut diagnostics).unwrap();
        assert_eq!(tree.folders.len(), 2);
        assert_eq!(tree.folders[1].display_name, "Inbox");
        assert_eq!(tree.folders[1].special, Some(SpecialFolder::Inbox));
        assert_eq!(tree.children.get(&0), Some(&vec![1]));
        assert_eq!(tree.topological(), vec![0, 1]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_message_assembly() {
        let database = sample_database();
        let reader = EdbReader::new(&database);
        let mut diagnostics = Diagnostics::new();

        let mut cursor = reader.messages(103, &mut diagnostics).unwrap();
        let (doc_id, email) = cursor.next().unwrap();
        assert_eq!(doc_id, 7);
        assert_eq!(email.message_class, "IPM.Note");
        assert_eq!(email.sender_name, "John Doe");
        assert_eq!(email.subject, "Hi all");
        assert_eq!(email.sender_email, "john@lab.example");
        assert!(email.is_read);
        assert!(email.date_received.is_some());
        assert_eq!(email.recipients_to.len(), 1);
        assert_eq!(email.recipients_to[0].email, "jane@example.com");
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].inid, Some(5));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_attachment_loading() {
        let database = sample_database();
        let reader = EdbReader::new(&database);
        let mut attachment = Attachment {
            inid: Some(5),
            ..Default::default()
        };
        reader.load_attachment(103, &mut attachment).unwrap();
        assert_eq!(attachment.filename, "notes.txt");
        assert_eq!(attachment.content_type.as_deref(), Some("text/plain"));
        assert_eq!(attachment.data.as_deref(), Some(&b"attached bytes"[..]));
    }

    #[test]
    fn test_orphan_routing() {
        let database = sample_database();
        let reader = EdbReader::new(&database);
        let mut diagnostics = Diagnostics::new();
        let mut tree = reader.folders(103, &mut diagnostics).unwrap();

        let index = tree.route(&[0xEE; 26]);
        assert_eq!(tree.folders[index].display_name, "Orphaned");
        // Routing again reuses the synthesized folder.
        assert_eq!(tree.route(&[0xDD; 26]), index);
    }

    #[test]
    fn test_cursor_seek() {
        let database = sample_database();
        let reader = EdbReader::new(&database);
        let mut diagnostics = Diagnostics::new();

        let mut cursor = reader.messages(103, &mut diagnostics).unwrap();
        cursor.seek(&Checkpoint {
            folder_id: Vec::new(),
            doc_id: 7,
        });
        assert!(cursor.next().is_none());

        let mut cursor = reader.messages(103, &mut diagnostics).unwrap();
        cursor.seek(&Checkpoint {
            folder_id: Vec::new(),
            doc_id: 3,
        });
        assert_eq!(cursor.next().unwrap().0, 7);
    }

    #[test]
    fn test_encryption_detection() {
        let database = sample_database();
        let reader = EdbReader::new(&database);
        assert!(reader.detect_encryption().is_none());

        let mut encrypted = sample_database();
        encrypted
            .tables
            .get_mut("Message_103")
            .unwrap()
            .rows[0]
            .insert("MessageClass".into(), value(&[0x81, 0x4F, 0x33, 0x90]));
        let reader = EdbReader::new(&encrypted);
        assert!(reader.detect_encryption().is_some());
    }
}
