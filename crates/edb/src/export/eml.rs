//! RFC 2822 / MIME emission of extracted messages.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};

use super::sanitize_filename_part;
use crate::model::{EmailAddress, EmailMessage};

const LINE_LIMIT: usize = 76;

/// `Date:` header format.
fn rfc2822_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

/// RFC 2047 encoded-word for header values beyond ASCII.
fn header_text(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    format!("=?UTF-8?B?{}?=", BASE64.encode(text.as_bytes()))
}

fn format_address(address: &EmailAddress) -> String {
    match (address.name.is_empty(), address.email.is_empty()) {
        (true, _) => address.email.clone(),
        (false, true) => header_text(&address.name),
        (false, false) => format!("\"{}\" <{}>", header_text(&address.name), address.email),
    }
}

fn address_header(name: &str, addresses: &[EmailAddress], out: &mut String) {
    if addresses.is_empty() {
        return;
    }
    let list = addresses
        .iter()
        .map(format_address)
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!("{name}: {list}\r\n"));
}

/// Base64 body encoding with 76-column wrapping.
fn base64_wrapped(data: &[u8]) -> String {
    let encoded = BASE64.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_LIMIT * 2);
    for chunk in encoded.as_bytes().chunks(LINE_LIMIT) {
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push_str("\r\n");
    }
    out
}

/// Quoted-printable with soft line breaks, used for text parts beyond ASCII.
fn quoted_printable(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut column = 0;

    for &byte in text.as_bytes() {
        let encoded = match byte {
            b'\r' | b'\n' => {
                out.push(byte as char);
                column = 0;
                continue;
            }
            b'=' => format!("={:02X}", byte),
            0x20..=0x7E => (byte as char).to_string(),
            _ => format!("={:02X}", byte),
        };
        if column + encoded.len() > LINE_LIMIT - 1 {
            out.push_str("=\r\n");
            column = 0;
        }
        out.push_str(&encoded);
        column += encoded.len();
    }
    out
}

fn text_part(text: &str, content_type: &str, out: &mut String) {
    out.push_str(&format!("Content-Type: {content_type}; charset=\"utf-8\"\r\n"));
    if text.is_ascii() {
        out.push_str("Content-Transfer-Encoding: 7bit\r\n\r\n");
        out.push_str(text);
    } else {
        out.push_str("Content-Transfer-Encoding: quoted-printable\r\n\r\n");
        out.push_str(&quoted_printable(text));
    }
    out.push_str("\r\n");
}

/// Serialize a message as an RFC 2822 EML document.
///
/// Both bodies present yields `multipart/alternative`; attachments add a
/// `multipart/mixed` wrapper.
pub fn format_eml(email: &EmailMessage) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "From: {}\r\n",
        format_address(&EmailAddress {
            name: email.sender_name.clone(),
            email: email.sender_email.clone(),
        })
    ));
    address_header("To", &email.recipients_to, &mut out);
    address_header("Cc", &email.recipients_cc, &mut out);
    address_header("Bcc", &email.recipients_bcc, &mut out);
    if let Some(date) = email.date_sent.or(email.date_received) {
        out.push_str(&format!("Date: {}\r\n", rfc2822_date(date)));
    }
    out.push_str(&format!("Subject: {}\r\n", header_text(&email.subject)));
    if !email.message_id.is_empty() {
        out.push_str(&format!("Message-ID: {}\r\n", email.message_id));
    }
    out.push_str("MIME-Version: 1.0\r\n");

    let text = email.effective_body_text();
    let has_alternative = !email.body_html.is_empty() && !text.is_empty();
    let attachments: Vec<_> = email
        .attachments
        .iter()
        .filter(|attachment| attachment.data.is_some())
        .collect();

    let body_section = |out: &mut String| {
        if has_alternative {
            out.push_str("Content-Type: multipart/alternative; boundary=\"=_alt\"\r\n\r\n");
            out.push_str("--=_alt\r\n");
            text_part(&text, "text/plain", out);
            out.push_str("--=_alt\r\n");
            text_part(&email.body_html, "text/html", out);
            out.push_str("--=_alt--\r\n");
        } else if !email.body_html.is_empty() {
            text_part(&email.body_html, "text/html", out);
        } else {
            text_part(&text, "text/plain", out);
        }
    };

    if attachments.is_empty() {
        body_section(&mut out);
        return out;
    }

    out.push_str("Content-Type: multipart/mixed; boundary=\"=_mixed\"\r\n\r\n");
    out.push_str("--=_mixed\r\n");
    body_section(&mut out);
    for attachment in attachments {
        let filename = if attachment.filename.is_empty() {
            "attachment.bin"
        } else {
            &attachment.filename
        };
        let content_type = attachment
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        out.push_str("--=_mixed\r\n");
        out.push_str(&format!(
            "Content-Type: {content_type}; name=\"{filename}\"\r\n"
        ));
        out.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{filename}\"\r\n"
        ));
        out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        out.push_str(&base64_wrapped(attachment.data.as_deref().unwrap_or_default()));
    }
    out.push_str("--=_mixed--\r\n");
    out
}

/// `{date}_{sender}_{subject}.eml`, sanitized and length-capped.
pub fn eml_filename(email: &EmailMessage) -> String {
    let date = email
        .date_received
        .or(email.date_sent)
        .map(|time| time.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| format!("msg{}", email.record_index));
    let sender = sanitize_filename_part(&email.sender_email, 30);
    let subject = sanitize_filename_part(&email.subject, 60);
    format!("{date}_{sender}_{subject}.eml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attachment;
    use chrono::TimeZone;

    fn sample_email() -> EmailMessage {
        EmailMessage {
            subject: "Hello".into(),
            sender_name: "A".into(),
            sender_email: "a@x.test".into(),
            recipients_to: vec![EmailAddress {
                name: String::new(),
                email: "b@y.test".into(),
            }],
            date_sent: Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).single(),
            message_id: "<one@x.test>".into(),
            body_text: "world".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_message_headers() {
        let eml = format_eml(&sample_email());
        assert!(eml.contains("From: \"A\" <a@x.test>\r\n"));
        assert!(eml.contains("To: b@y.test\r\n"));
        assert!(eml.contains("Subject: Hello\r\n"));
        assert!(eml.contains("Message-ID: <one@x.test>\r\n"));
        assert!(eml.contains("Date: Mon, 01 Jul 2024 10:00:00 +0000\r\n"));
        assert!(eml.contains("\r\n\r\nworld"));
        assert!(!eml.contains("multipart"));
    }

    #[test]
    fn test_attachment_wrapper() {
        let mut email = sample_email();
        email.attachments.push(Attachment {
            filename: "data.bin".into(),
            content_type: Some("application/octet-stream".into()),
            size: 4,
            data: Some(vec![0, 1, 2, 3]),
            inid: None,
        });
        let eml = format_eml(&email);
        assert!(eml.contains("multipart/mixed"));
        assert!(eml.contains("filename=\"data.bin\""));
        assert!(eml.contains("AAECAw==\r\n"));
    }

    #[test]
    fn test_alternative_bodies() {
        let mut email = sample_email();
        email.body_html = "<p>world</p>".into();
        let eml = format_eml(&email);
        assert!(eml.contains("multipart/alternative"));
        assert!(eml.contains("text/plain"));
        assert!(eml.contains("text/html"));
    }

    #[test]
    fn test_quoted_printable_for_non_ascii() {
        let mut email = sample_email();
        email.body_text = "h\u{00E9}llo".into();
        let eml = format_eml(&email);
        assert!(eml.contains("Content-Transfer-Encoding: quoted-printable"));
        assert!(eml.contains("h=C3=A9llo"));
    }

    #[test]
    fn test_base64_wraps_at_76_columns() {
        let wrapped = base64_wrapped(&vec![0xFF; 100]);
        let first_line = wrapped.lines().next().unwrap();
        assert_eq!(first_line.len(), 76);
    }
}
