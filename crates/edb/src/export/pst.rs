//! PST synthesis from extracted mailbox content.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use pst_writer::messaging::{
    PR_CLIENT_SUBMIT_TIME, PR_DISPLAY_TO, PR_HTML, PR_IMPORTANCE, PR_INTERNET_MESSAGE_ID,
    PR_MESSAGE_CLASS, PR_MESSAGE_DELIVERY_TIME, PR_SENDER_ADDRTYPE, PR_SENDER_EMAIL_ADDRESS,
    PR_SENDER_NAME, PR_SUBJECT,
};
use pst_writer::{
    AttachmentProperties, CancelFlag, FolderId, MessageProperties, PropertyValue, PstWriter,
    RecipientRow,
};

use super::ExportSummary;
use crate::error::{Diagnostics, EdbError, Result};
use crate::model::{EmailMessage, SpecialFolder};
use crate::reader::EdbReader;
use crate::time::to_filetime;

/// `PR_CONTAINER_CLASS` for special folders.
fn container_class(special: Option<SpecialFolder>) -> Option<&'static str> {
    match special? {
        SpecialFolder::Calendar => Some("IPF.Appointment"),
        SpecialFolder::Contacts => Some("IPF.Contact"),
        SpecialFolder::Journal => Some("IPF.Journal"),
        SpecialFolder::Notes => Some("IPF.StickyNote"),
        SpecialFolder::Tasks => Some("IPF.Task"),
        _ => None,
    }
}

/// Translate an extracted message into the writer's property set.
pub fn email_to_properties(email: &EmailMessage) -> MessageProperties {
    let mut message = MessageProperties {
        is_read: email.is_read,
        ..Default::default()
    };
    let properties = &mut message.properties;

    properties.insert(
        PR_MESSAGE_CLASS,
        PropertyValue::Unicode(if email.message_class.is_empty() {
            "IPM.Note".to_string()
        } else {
            email.message_class.clone()
        }),
    );
    properties.insert(PR_SUBJECT, PropertyValue::Unicode(email.subject.clone()));
    properties.insert(
        PR_SENDER_NAME,
        PropertyValue::Unicode(email.sender_name.clone()),
    );
    properties.insert(
        PR_SENDER_EMAIL_ADDRESS,
        PropertyValue::Unicode(email.sender_email.clone()),
    );
    properties.insert(
        PR_SENDER_ADDRTYPE,
        PropertyValue::Unicode("SMTP".to_string()),
    );
    properties.insert(
        PR_IMPORTANCE,
        PropertyValue::Integer32(email.importance.to_value()),
    );
    if !email.message_id.is_empty() {
        properties.insert(
            PR_INTERNET_MESSAGE_ID,
            PropertyValue::Unicode(email.message_id.clone()),
        );
    }
    if let Some(sent) = email.date_sent {
        properties.insert(PR_CLIENT_SUBMIT_TIME, PropertyValue::Time(to_filetime(sent)));
    }
    if let Some(received) = email.date_received {
        properties.insert(
            PR_MESSAGE_DELIVERY_TIME,
            PropertyValue::Time(to_filetime(received)),
        );
    }

    let text = email.effective_body_text();
    if !text.is_empty() {
        properties.insert(
            pst_writer::messaging::PR_BODY,
            PropertyValue::Unicode(text),
        );
    }
    if !email.body_html.is_empty() {
        properties.insert(
            PR_HTML,
            PropertyValue::Binary(email.body_html.as_bytes().to_vec()),
        );
    }

    let display_to = email
        .recipients_to
        .iter()
        .map(|address| {
            if address.name.is_empty() {
                address.email.clone()
            } else {
                address.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("; ");
    if !display_to.is_empty() {
        properties.insert(PR_DISPLAY_TO, PropertyValue::Unicode(display_to));
    }

    for (bucket, recipient_type) in [
        (&email.recipients_to, 1_i32),
        (&email.recipients_cc, 2),
        (&email.recipients_bcc, 3),
    ] {
        for address in bucket.iter() {
            message.recipients.push(RecipientRow {
                recipient_type,
                display_name: address.name.clone(),
                email_address: address.email.clone(),
            });
        }
    }

    for attachment in &email.attachments {
        let Some(data) = &attachment.data else {
            continue;
        };
        message.attachments.push(AttachmentProperties {
            filename: attachment.filename.clone(),
            long_filename: attachment.filename.clone(),
            mime_tag: attachment.content_type.clone(),
            method: 1,
            data: data.clone(),
        });
    }

    message
}

/// Export one mailbox (optionally a single folder subtree) into a new PST.
///
/// Folders are created in parent-before-child order under "Top of Personal
/// Folders"; messages commit in ascending document-ID order. A cancelled or
/// failed run leaves no file behind.
pub fn export_to_pst(
    reader: &EdbReader<'_>,
    mailbox_number: u64,
    only_folder: Option<&[u8]>,
    output: &Path,
    cancel: CancelFlag,
    diagnostics: &mut Diagnostics,
) -> Result<ExportSummary> {
    let mut tree = reader.folders(mailbox_number, diagnostics)?;

    let mut record_key = [0_u8; 16];
    let mut display_name = format!("Mailbox {mailbox_number}");
    for mailbox in reader.mailboxes(diagnostics) {
        if mailbox.mailbox_number == mailbox_number {
            let len = mailbox.guid.len().min(16);
            record_key[..len].copy_from_slice(&mailbox.guid[..len]);
            if !mailbox.owner_display_name.is_empty() {
                display_name = mailbox.owner_display_name.clone();
            }
        }
    }

    let mut writer = PstWriter::create(output, &display_name, record_key)?;
    writer.set_cancel_flag(cancel.clone());

    // Map EDB folders onto PST folders. Root-level containers collapse onto
    // the writer's own hierarchy.
    let mut mapping: BTreeMap<usize, FolderId> = BTreeMap::new();
    for index in tree.topological() {
        let folder = &tree.folders[index];
        if let Some(only) = only_folder {
            if !folder_in_subtree(&tree, index, only) {
                continue;
            }
        }
        let target = match folder.special {
            Some(SpecialFolder::Root) | Some(SpecialFolder::IpmSubtree) => writer.ipm_subtree(),
            Some(SpecialFolder::DeletedItems) => writer.wastebasket(),
            _ => {
                let parent = tree
                    .folders
                    .iter()
                    .position(|candidate| candidate.folder_id == folder.parent_id)
                    .and_then(|parent_index| mapping.get(&parent_index).copied())
                    .unwrap_or_else(|| writer.ipm_subtree());
                writer.create_folder(
                    parent,
                    &folder.display_name,
                    container_class(folder.special),
                )?
            }
        };
        mapping.insert(index, target);
    }

    let mut summary = ExportSummary::default();
    let mut pending: Vec<(u64, EmailMessage)> = Vec::new();
    {
        let mut cursor = reader.messages(mailbox_number, diagnostics)?;
        for (doc_id, email) in cursor.by_ref() {
            pending.push((doc_id, email));
        }
    }

    for (_, mut email) in pending {
        if cancel.is_cancelled() {
            return Err(EdbError::Cancelled);
        }
        if email.is_hidden {
            continue;
        }
        summary.processed += 1;

        let folder_index = tree.route(&email.folder_id);
        let target = match mapping.get(&folder_index) {
            Some(&target) => target,
            // A synthesized orphan folder appears only after routing.
            None if only_folder.is_none() => {
                let created = writer.create_folder(
                    writer.ipm_subtree(),
                    &tree.folders[folder_index].display_name,
                    None,
                )?;
                mapping.insert(folder_index, created);
                created
            }
            None => {
                // Outside the exported subtree.
                summary.processed -= 1;
                continue;
            }
        };

        for attachment in &mut email.attachments {
            if let Err(error) = reader.load_attachment(mailbox_number, attachment) {
                diagnostics.record(&error);
            }
        }

        match writer.add_message(target, email_to_properties(&email)) {
            Ok(nid) => {
                debug!(nid, "message committed");
                summary.exported += 1;
            }
            Err(error) => {
                warn!(%error, "message export failed");
                let error = EdbError::from(error);
                if matches!(error, EdbError::Cancelled | EdbError::PstSpaceExhausted) {
                    return Err(error);
                }
                diagnostics.record(&error);
                summary.failed += 1;
            }
        }
    }

    writer.finish()?;
    Ok(summary)
}

/// Whether `index` equals or descends from the folder with `folder_id`.
fn folder_in_subtree(tree: &crate::reader::FolderTree, index: usize, folder_id: &[u8]) -> bool {
    let mut current = index;
    loop {
        let folder = &tree.folders[current];
        if folder.folder_id == folder_id {
            return true;
        }
        let Some(parent) = tree
            .folders
            .iter()
            .position(|candidate| candidate.folder_id == folder.parent_id)
        else {
            return false;
        };
        if parent == current {
            return false;
        }
        current = parent;
    }
}
