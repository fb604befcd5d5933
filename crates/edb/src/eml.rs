//! RFC 5322 → MAPI translation: parses an EML message and emits the tagged
//! property set, recipient rows and attachments the PST writer consumes.

use mail_parser::{Address, MessageParser, MimeHeaders};

use pst_writer::messaging::{
    PR_BODY, PR_CLIENT_SUBMIT_TIME, PR_DISPLAY_CC, PR_DISPLAY_TO, PR_HTML, PR_IMPORTANCE,
    PR_INTERNET_MESSAGE_ID, PR_MESSAGE_CLASS, PR_MESSAGE_DELIVERY_TIME, PR_SENDER_ADDRTYPE,
    PR_SENDER_EMAIL_ADDRESS, PR_SENDER_NAME, PR_SUBJECT,
};
use pst_writer::{AttachmentProperties, MessageProperties, PropertyValue, RecipientRow};

use crate::error::{EdbError, Result};
use crate::time::to_filetime;

/// Flatten a parsed address header into (name, email) pairs.
fn flatten_addresses(address: &Address<'_>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    match address {
        Address::List(list) => {
            for addr in list {
                out.push((
                    addr.name.as_deref().unwrap_or_default().to_string(),
                    addr.address.as_deref().unwrap_or_default().to_string(),
                ));
            }
        }
        Address::Group(groups) => {
            for group in groups {
                for addr in &group.addresses {
                    out.push((
                        addr.name.as_deref().unwrap_or_default().to_string(),
                        addr.address.as_deref().unwrap_or_default().to_string(),
                    ));
                }
            }
        }
    }
    out
}

fn display_list(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(name, email)| if name.is_empty() { email } else { name }.clone())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse an RFC 5322 message into the property set the PST writer consumes.
pub fn translate_eml(raw: &[u8]) -> Result<MessageProperties> {
    let parsed = MessageParser::default().parse(raw).ok_or_else(|| {
        EdbError::MalformedDatabase {
            path: Default::default(),
            reason: "unparseable RFC 5322 message".into(),
        }
    })?;

    let mut message = MessageProperties {
        is_read: true,
        ..Default::default()
    };
    let properties = &mut message.properties;

    properties.insert(
        PR_MESSAGE_CLASS,
        PropertyValue::Unicode("IPM.Note".to_string()),
    );

    if let Some(subject) = parsed.subject() {
        properties.insert(PR_SUBJECT, PropertyValue::Unicode(subject.to_string()));
    }

    if let Some((name, email)) = parsed
        .from()
        .map(flatten_addresses)
        .and_then(|pairs| pairs.into_iter().next())
    {
        let display = if name.is_empty() { email.clone() } else { name };
        properties.insert(PR_SENDER_NAME, PropertyValue::Unicode(display));
        properties.insert(PR_SENDER_EMAIL_ADDRESS, PropertyValue::Unicode(email));
        properties.insert(
            PR_SENDER_ADDRTYPE,
            PropertyValue::Unicode("SMTP".to_string()),
        );
    }

    for (header, recipient_type, display_tag) in [
        (parsed.to(), 1_i32, Some(PR_DISPLAY_TO)),
        (parsed.cc(), 2, Some(PR_DISPLAY_CC)),
        (parsed.bcc(), 3, None),
    ] {
        let Some(address) = header else {
            continue;
        };
        let pairs = flatten_addresses(address);
        if pairs.is_empty() {
            continue;
        }
        if let Some(tag) = display_tag {
            properties.insert(tag, PropertyValue::Unicode(display_list(&pairs)));
        }
        for (name, email) in pairs {
            message.recipients.push(RecipientRow {
                recipient_type,
                display_name: name,
                email_address: email,
            });
        }
    }

    if let Some(date) = parsed.date() {
        let ticks = chrono::DateTime::from_timestamp(date.to_timestamp(), 0)
            .map(to_filetime)
            .unwrap_or_default();
        properties.insert(PR_CLIENT_SUBMIT_TIME, PropertyValue::Time(ticks));
        properties.insert(PR_MESSAGE_DELIVERY_TIME, PropertyValue::Time(ticks));
    }

    if let Some(importance) = parsed.header("Importance").and_then(|value| value.as_text()) {
        let level = match importance.to_ascii_lowercase().as_str() {
            "low" => 0,
            "high" => 2,
            _ => 1,
        };
        properties.insert(PR_IMPORTANCE, PropertyValue::Integer32(level));
    }

    if let Some(message_id) = parsed.message_id() {
        properties.insert(
            PR_INTERNET_MESSAGE_ID,
            PropertyValue::Unicode(format!("<{message_id}>")),
        );
    }

    if let Some(text) = parsed.body_text(0) {
        properties.insert(PR_BODY, PropertyValue::Unicode(text.to_string()));
    }
    if let Some(html) = parsed.body_html(0) {
        properties.insert(
            PR_HTML,
            PropertyValue::Binary(html.as_bytes().to_vec()),
        );
    }

    for part in parsed.attachments() {
        let filename = part
            .attachment_name()
            .unwrap_or("attachment.bin")
            .to_string();
        let mime_tag = part.content_type().map(|content_type| {
            match content_type.subtype() {
                Some(subtype) => format!("{}/{}", content_type.ctype(), subtype),
                None => content_type.ctype().to_string(),
            }
        });
        message.attachments.push(AttachmentProperties {
            long_filename: filename.clone(),
            filename,
            mime_tag,
            method: 1,
            data: part.contents().to_vec(),
        });
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pst_writer::messaging::{PR_SENDER_NAME, PR_SUBJECT};

    const SIMPLE: &[u8] = b"From: \"A\" <a@x.test>\r\n\
To: b@y.test\r\n\
Subject: Hello\r\n\
Date: Mon, 1 Jul 2024 10:00:00 +0000\r\n\
Message-ID: <one@x.test>\r\n\
\r\n\
world\r\n";

    #[test]
    fn test_simple_message_mapping() {
        let message = translate_eml(SIMPLE).unwrap();

        assert!(matches!(
            message.properties.get(&PR_SUBJECT),
            Some(PropertyValue::Unicode(subject)) if subject == "Hello"
        ));
        assert!(matches!(
            message.properties.get(&PR_SENDER_NAME),
            Some(PropertyValue::Unicode(name)) if name == "A"
        ));
        assert!(matches!(
            message.properties.get(&PR_SENDER_EMAIL_ADDRESS),
            Some(PropertyValue::Unicode(email)) if email == "a@x.test"
        ));
        assert!(matches!(
            message.properties.get(&PR_BODY),
            Some(PropertyValue::Unicode(body)) if body.trim_end() == "world"
        ));
        assert!(message.properties.contains_key(&PR_CLIENT_SUBMIT_TIME));

        assert_eq!(message.recipients.len(), 1);
        assert_eq!(message.recipients[0].recipient_type, 1);
        assert_eq!(message.recipients[0].email_address, "b@y.test");
    }

    #[test]
    fn test_importance_header() {
        let raw = b"From: a@x.test\r\nImportance: High\r\nSubject: x\r\n\r\nbody\r\n";
        let message = translate_eml(raw).unwrap();
        assert!(matches!(
            message.properties.get(&PR_IMPORTANCE),
            Some(PropertyValue::Integer32(2))
        ));
    }

    #[test]
    fn test_attachment_extraction() {
        let raw = b"From: a@x.test\r\n\
To: b@y.test\r\n\
Subject: att\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/plain\r\n\
\r\n\
see attachment\r\n\
--XX\r\n\
Content-Type: application/octet-stream; name=\"data.bin\"\r\n\
Content-Disposition: attachment; filename=\"data.bin\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
AAECAw==\r\n\
--XX--\r\n";
        let message = translate_eml(raw).unwrap();
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].filename, "data.bin");
        assert_eq!(message.attachments[0].data, vec![0, 1, 2, 3]);
        assert_eq!(
            message.attachments[0].mime_tag.as_deref(),
            Some("application/octet-stream")
        );
    }
}
