//! vCard 3.0 emission of contacts.

use crate::model::Contact;

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// The structured `N` value: surname;given;;; from a display name.
fn structured_name(display_name: &str) -> String {
    let mut parts = display_name.split_whitespace();
    let given = parts.next().unwrap_or_default();
    let surname = parts.collect::<Vec<_>>().join(" ");
    format!("{};{};;;", escape_text(&surname), escape_text(given))
}

/// Serialize contacts, one VCARD per contact, UTF-8 charset.
pub fn format_vcf(contacts: &[Contact]) -> String {
    let mut out = String::new();

    for contact in contacts {
        out.push_str("BEGIN:VCARD\r\n");
        out.push_str("VERSION:3.0\r\n");
        out.push_str(&format!("FN:{}\r\n", escape_text(&contact.display_name)));
        out.push_str(&format!("N:{}\r\n", structured_name(&contact.display_name)));
        for email in &contact.emails {
            out.push_str(&format!("EMAIL;TYPE=INTERNET:{email}\r\n"));
        }
        for phone in &contact.phones {
            out.push_str(&format!(
                "TEL;TYPE={}:{}\r\n",
                phone.kind.to_uppercase(),
                phone.value
            ));
        }
        if !contact.company.is_empty() {
            out.push_str(&format!("ORG:{}\r\n", escape_text(&contact.company)));
        }
        if !contact.title.is_empty() {
            out.push_str(&format!("TITLE:{}\r\n", escape_text(&contact.title)));
        }
        for address in &contact.addresses {
            out.push_str(&format!(
                "ADR;TYPE={}:;;{};;;;\r\n",
                address.kind.to_uppercase(),
                escape_text(&address.value)
            ));
        }
        out.push_str("END:VCARD\r\n");
    }
    out
}
