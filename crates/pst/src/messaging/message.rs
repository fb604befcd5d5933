//! ## [Messages](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/1042af37-aaa4-4edc-bffd-90a1ede24188)
//!
//! A message is a PC node whose sub-node tree carries the Recipients TC, the
//! Attachments TC and one attachment PC per attachment.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, Write};

use super::{folder::tag, *};
use crate::ltp::prop_context::{PTYPE_INTEGER32, PTYPE_UNICODE};
use crate::ndb::{
    block::SubNodeEntry,
    node_id::{NidAllocator, NodeId, NodeIdType, NID_ATTACHMENT_TABLE, NID_RECIPIENT_TABLE},
    writer::NdbWriter,
};

/// `PR_OBJECT_TYPE` of a mail user.
const MAPI_MAILUSER: i32 = 6;

fn recipient_columns() -> Vec<u32> {
    vec![
        tag(PR_RECIPIENT_TYPE, PTYPE_INTEGER32),
        tag(PR_ROWID, PTYPE_INTEGER32),
        tag(PR_OBJECT_TYPE, PTYPE_INTEGER32),
        tag(PR_DISPLAY_NAME, PTYPE_UNICODE),
        tag(PR_ADDRTYPE, PTYPE_UNICODE),
        tag(PR_EMAIL_ADDRESS, PTYPE_UNICODE),
        tag(PR_SMTP_ADDRESS, PTYPE_UNICODE),
    ]
}

fn attachment_columns() -> Vec<u32> {
    vec![
        tag(PR_ATTACH_SIZE, PTYPE_INTEGER32),
        tag(PR_ATTACH_FILENAME, PTYPE_UNICODE),
        tag(PR_ATTACH_LONG_FILENAME, PTYPE_UNICODE),
        tag(PR_ATTACH_METHOD, PTYPE_INTEGER32),
        tag(PR_ATTACH_RENDERING_POSITION, PTYPE_INTEGER32),
        tag(PR_ATTACH_MIME_TAG, PTYPE_UNICODE),
    ]
}

/// The emitted message node plus the summary values its folder's Contents
/// table row carries.
pub(crate) struct WrittenMessage {
    pub nid: NodeId,
    pub summary: BTreeMap<u16, PropertyValue>,
    pub is_read: bool,
}

/// Rough `PR_MESSAGE_SIZE`: variable property payloads plus attachment bytes.
fn message_size(message: &MessageProperties) -> i32 {
    let property_bytes: usize = message
        .properties
        .values()
        .filter_map(|value| value.variable_bytes().map(|bytes| bytes.len()))
        .sum();
    let attachment_bytes: usize = message
        .attachments
        .iter()
        .map(|attachment| attachment.data.len())
        .sum();
    (property_bytes + attachment_bytes).min(i32::MAX as usize) as i32
}

/// Emit one message and register its node.
pub(crate) fn write_message<F>(
    ndb: &mut NdbWriter<F>,
    nids: &mut NidAllocator,
    folder_nid: NodeId,
    mut message: MessageProperties,
) -> io::Result<WrittenMessage>
where
    F: Read + Write + Seek,
{
    let nid = nids.allocate(NodeIdType::NormalMessage)?;

    let mut flags = 0_i32;
    if message.is_read {
        flags |= MSGFLAG_READ;
    }
    if !message.attachments.is_empty() {
        flags |= MSGFLAG_HASATTACH;
    }
    let size = message_size(&message);

    insert_if_absent(
        &mut message.properties,
        PR_MESSAGE_CLASS,
        PropertyValue::Unicode("IPM.Note".into()),
    );
    message
        .properties
        .insert(PR_MESSAGE_FLAGS, PropertyValue::Integer32(flags));
    message
        .properties
        .insert(PR_MESSAGE_SIZE, PropertyValue::Integer32(size));
    if let Some(delivery) = message
        .properties
        .get(&PR_MESSAGE_DELIVERY_TIME)
        .or_else(|| message.properties.get(&PR_CLIENT_SUBMIT_TIME))
        .cloned()
    {
        insert_if_absent(&mut message.properties, PR_CREATION_TIME, delivery.clone());
        insert_if_absent(&mut message.properties, PR_LAST_MODIFICATION_TIME, delivery);
    }

    let summary = contents_summary(&message.properties);

    // Recipients table.
    let mut recipients = TableContextWriter::new(&recipient_columns())?;
    for (index, recipient) in message.recipients.iter().enumerate() {
        let mut values = BTreeMap::new();
        values.insert(
            PR_RECIPIENT_TYPE,
            PropertyValue::Integer32(recipient.recipient_type),
        );
        values.insert(PR_ROWID, PropertyValue::Integer32(index as i32));
        values.insert(PR_OBJECT_TYPE, PropertyValue::Integer32(MAPI_MAILUSER));
        values.insert(
            PR_DISPLAY_NAME,
            PropertyValue::Unicode(if recipient.display_name.is_empty() {
                recipient.email_address.clone()
            } else {
                recipient.display_name.clone()
            }),
        );
        values.insert(PR_ADDRTYPE, PropertyValue::Unicode("SMTP".into()));
        values.insert(
            PR_EMAIL_ADDRESS,
            PropertyValue::Unicode(recipient.email_address.clone()),
        );
        values.insert(
            PR_SMTP_ADDRESS,
            PropertyValue::Unicode(recipient.email_address.clone()),
        );
        recipients.add_row(index as u32, values)?;
    }

    let mut subnodes: Vec<SubNodeEntry> = Vec::new();
    let (data, sub) = write_tc_node(ndb, recipients)?;
    subnodes.push(SubNodeEntry {
        nid: NID_RECIPIENT_TABLE,
        data,
        sub,
    });

    // Attachments: a table row and a PC sub-node per attachment.
    if !message.attachments.is_empty() {
        let mut table = TableContextWriter::new(&attachment_columns())?;
        for (index, attachment) in message.attachments.iter().enumerate() {
            let attachment_nid =
                NodeId::new(NodeIdType::Attachment, index as u32 + 1)?;

            let mut values = BTreeMap::new();
            values.insert(
                PR_ATTACH_SIZE,
                PropertyValue::Integer32(attachment.data.len() as i32),
            );
            values.insert(
                PR_ATTACH_FILENAME,
                PropertyValue::Unicode(attachment.filename.clone()),
            );
            values.insert(
                PR_ATTACH_LONG_FILENAME,
                PropertyValue::Unicode(attachment.long_filename.clone()),
            );
            values.insert(PR_ATTACH_METHOD, PropertyValue::Integer32(attachment.method));
            values.insert(PR_ATTACH_RENDERING_POSITION, PropertyValue::Integer32(-1));
            if let Some(mime) = &attachment.mime_tag {
                values.insert(PR_ATTACH_MIME_TAG, PropertyValue::Unicode(mime.clone()));
            }
            table.add_row(u32::from(attachment_nid), values.clone())?;

            let mut pc = PropertyContextWriter::new();
            pc.insert(
                PR_ATTACH_DATA_BIN,
                PropertyValue::Binary(attachment.data.clone()),
            );
            for (prop_id, value) in values {
                pc.insert(prop_id, value);
            }
            let (data, sub) = write_pc_node(ndb, pc)?;
            subnodes.push(SubNodeEntry {
                nid: attachment_nid,
                data,
                sub,
            });
        }

        let (data, sub) = write_tc_node(ndb, table)?;
        subnodes.push(SubNodeEntry {
            nid: NID_ATTACHMENT_TABLE,
            data,
            sub,
        });
    }

    // Message PC; spilled values join the same sub-node tree.
    let mut pc = PropertyContextWriter::new();
    for (prop_id, value) in &message.properties {
        pc.insert(*prop_id, value.clone());
    }
    let mut nodes = LtpNodeAllocator::default();
    let blocks = pc.finish(ndb, &mut nodes, &mut subnodes)?;
    let data = ndb.write_data_blocks(&blocks)?;
    let sub = ndb.write_subnodes(&mut subnodes)?;

    ndb.add_node(nid, folder_nid, data, sub)?;

    Ok(WrittenMessage {
        nid,
        summary,
        is_read: message.is_read,
    })
}

/// Extract the Contents-table summary values from the final property set.
fn contents_summary(properties: &BTreeMap<u16, PropertyValue>) -> BTreeMap<u16, PropertyValue> {
    const SUMMARY_IDS: [u16; 9] = [
        PR_IMPORTANCE,
        PR_MESSAGE_CLASS,
        PR_SUBJECT,
        PR_CLIENT_SUBMIT_TIME,
        PR_SENDER_NAME,
        PR_DISPLAY_TO,
        PR_MESSAGE_DELIVERY_TIME,
        PR_MESSAGE_FLAGS,
        PR_MESSAGE_SIZE,
    ];
    SUMMARY_IDS
        .iter()
        .filter_map(|prop_id| {
            properties
                .get(prop_id)
                .map(|value| (*prop_id, value.clone()))
        })
        .collect()
}
