//! PropertyBlob and RecipientList parsing.
//!
//! The layout of these blobs is not documented; fields are recovered by
//! marker scanning. A decompressed PropertyBlob carries the sender's legacy
//! DN (`/o=…/cn=Recipients/cn=<GUID>-<NAME>`), and `<NAME>M`/`<NAME>I`
//! sentinels introducing length-prefixed subject payloads; free-standing
//! `M`-entries carry SMTP addresses and the Message-ID.

/// Cap on a VLQ-announced payload; anything larger is treated as blob damage.
const MAX_VLQ_LEN: usize = 1 << 20;

/// Fields recovered from a message's PropertyBlob.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct PropertyBlobInfo {
    pub sender_name: String,
    pub sender_email: String,
    pub subject: String,
    pub message_id: String,
}

/// One recipient recovered from a RecipientList blob.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RecipientEntry {
    /// Display name as stored (uppercase).
    pub name: String,
    pub email: String,
}

/// Little-endian base-128 length: a single byte below 0x80, otherwise
/// low-seven-bit groups until a byte with the high bit clear.
fn read_vlq(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0_usize;
    for (index, &byte) in bytes.iter().enumerate().take(5) {
        value |= ((byte & 0x7F) as usize) << (7 * index);
        if byte & 0x80 == 0 {
            if value > MAX_VLQ_LEN {
                return None;
            }
            return Some((value, index + 1));
        }
    }
    None
}

/// Recover display casing from an uppercase name: first letter of each
/// whitespace-separated token upper, the rest lower.
pub fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>()
                        + &chars.flat_map(char::to_lowercase).collect::<String>()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    let local_ok = local
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"._%+-".contains(&b));
    let domain_ok = domain
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-');
    let tld_ok = domain
        .rsplit_once('.')
        .is_some_and(|(_, tld)| tld.len() >= 2 && tld.bytes().all(|b| b.is_ascii_alphabetic()));
    local_ok && domain_ok && tld_ok
}

/// All plausible `M`-entries: marker position and ASCII payload.
fn scan_m_entries(blob: &[u8]) -> Vec<(usize, String)> {
    let mut entries = Vec::new();
    for (position, &byte) in blob.iter().enumerate() {
        if byte != b'M' {
            continue;
        }
        let Some((length, consumed)) = read_vlq(&blob[position + 1..]) else {
            continue;
        };
        if length == 0 || length > 2048 {
            continue;
        }
        let start = position + 1 + consumed;
        let Some(payload) = blob.get(start..start + length) else {
            continue;
        };
        if !payload.iter().all(|&b| (0x20..0x7F).contains(&b)) {
            continue;
        }
        // Safe: all bytes checked printable ASCII.
        entries.push((position, String::from_utf8_lossy(payload).into_owned()));
    }
    entries
}

/// The uppercase name segment of the sender's legacy DN, after the last `-`
/// of the `cn=<GUID>-<NAME>` component.
fn find_legacy_dn_name(blob: &[u8]) -> Option<(usize, String)> {
    let lowered: Vec<u8> = blob.iter().map(u8::to_ascii_lowercase).collect();
    let marker = b"/cn=recipients/cn=";
    let at = lowered
        .windows(marker.len())
        .position(|window| window == marker)?;
    let start = at + marker.len();

    let mut end = start;
    while end < blob.len() {
        let byte = blob[end];
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' || byte == b' ' || byte == b'_'
        {
            end += 1;
        } else {
            break;
        }
    }
    let component = std::str::from_utf8(&blob[start..end]).ok()?;
    let name = component.rsplit_once('-').map(|(_, name)| name)?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((at, name.to_string()))
}

/// Decode the subject payload after a sentinel at `position` (the marker
/// byte index). `wide` selects the UTF-16LE (`I`) form.
fn subject_at(blob: &[u8], position: usize, wide: bool) -> Option<String> {
    let (length, consumed) = read_vlq(blob.get(position + 1..)?)?;
    let mut start = position + 1 + consumed;

    if wide {
        // Short wide lengths are followed by a spare zero byte.
        if consumed == 1 && blob.get(start) == Some(&0) && blob.get(start + 1) != Some(&0) {
            start += 1;
        }
        let payload = blob.get(start..start + length * 2)?;
        Some(crate::strings::decode_utf16le(payload).text)
    } else {
        let payload = blob.get(start..start + length)?;
        Some(crate::strings::decode_utf8(payload).text)
    }
}

/// Find the subject sentinel `<name>M`/`<name>I` for the given uppercase
/// name, trying progressively shorter prefixes when Exchange truncated the
/// name. Returns (sentinel marker position, subject).
fn find_subject(blob: &[u8], name: &str) -> Option<(usize, String)> {
    let name_bytes = name.as_bytes();
    let mut fallback: Option<(usize, String)> = None;

    for prefix_len in (3..=name_bytes.len()).rev() {
        let prefix = &name_bytes[..prefix_len];
        let mut search = 0;
        while let Some(at) = find_subsequence(&blob[search..], prefix) {
            let marker = search + at + prefix.len();
            search += at + 1;
            let Some(&marker_byte) = blob.get(marker) else {
                continue;
            };
            let wide = match marker_byte {
                b'M' => false,
                b'I' => true,
                _ => continue,
            };
            let Some(subject) = subject_at(blob, marker, wide) else {
                continue;
            };
            if subject.is_empty() {
                // Remember the position; a later duplicate may carry text.
                fallback.get_or_insert((marker, subject));
                continue;
            }
            return Some((marker, subject));
        }
        if let Some(found) = fallback.take() {
            return Some(found);
        }
    }
    None
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Generic sentinel discovery for blobs without a legacy DN: an uppercase
/// (or non-ASCII) run immediately before an `M`/`I` marker with a plausible
/// length-prefixed payload.
fn discover_sentinel(blob: &[u8]) -> Option<(usize, String, String)> {
    let mut fallback: Option<(usize, String, String)> = None;
    for (position, &byte) in blob.iter().enumerate() {
        let wide = match byte {
            b'M' => false,
            b'I' => true,
            _ => continue,
        };

        // Walk back over name bytes.
        let mut start = position;
        while start > 0 {
            let previous = blob[start - 1];
            let name_byte = previous.is_ascii_uppercase()
                || previous == b' '
                || previous.is_ascii_digit()
                || previous >= 0x80;
            if name_byte && position - start < 64 {
                start -= 1;
            } else {
                break;
            }
        }
        // Skip a leading UTF-8 continuation byte cut mid-sequence.
        while start < position && (0x80..0xC0).contains(&blob[start]) {
            start += 1;
        }
        if position - start < 2 {
            continue;
        }

        let name = String::from_utf8_lossy(&blob[start..position])
            .trim()
            .to_string();
        if name.len() < 2 || !name.chars().any(char::is_alphabetic) {
            continue;
        }
        let Some(subject) = subject_at(blob, position, wide) else {
            continue;
        };
        if subject.is_empty() {
            fallback.get_or_insert((position, name, subject));
            continue;
        }
        return Some((position, name, subject));
    }
    fallback
}

/// Parse a decompressed PropertyBlob. Absent fields stay empty; the parser
/// never fails.
pub fn parse_property_blob(blob: &[u8]) -> PropertyBlobInfo {
    let mut info = PropertyBlobInfo::default();
    let mut sentinel_position = 0;

    if let Some((_, dn_name)) = find_legacy_dn_name(blob) {
        info.sender_name = title_case(&dn_name);
        if let Some((position, subject)) = find_subject(blob, &dn_name) {
            sentinel_position = position;
            info.subject = subject;
        }
    } else if let Some((position, name, subject)) = discover_sentinel(blob) {
        sentinel_position = position;
        info.sender_name = title_case(&name);
        info.subject = subject;
    }

    let entries = scan_m_entries(blob);

    // Sender address: the first address entry past the sentinel, checked
    // against the tail where Exchange repeats sender, owner, sender.
    info.sender_email = entries
        .iter()
        .filter(|(position, _)| *position > sentinel_position)
        .map(|(_, payload)| payload)
        .find(|payload| is_email(payload))
        .cloned()
        .unwrap_or_default();

    let tail_start = blob.len().saturating_sub(512);
    let tail_emails: Vec<&String> = entries
        .iter()
        .filter(|(position, _)| *position >= tail_start)
        .map(|(_, payload)| payload)
        .filter(|payload| is_email(payload))
        .collect();
    if tail_emails.len() >= 3 && tail_emails.first() == tail_emails.last() {
        let repeated = tail_emails[0].clone();
        if info.sender_email.is_empty() {
            info.sender_email = repeated;
        }
    }

    info.message_id = entries
        .iter()
        .map(|(_, payload)| payload)
        .find(|payload| payload.starts_with('<') && payload.ends_with('>') && payload.contains('@'))
        .cloned()
        .unwrap_or_default();

    info
}

/// Parse a decompressed RecipientList blob: `ProP`-led sub-blocks, one per
/// recipient, each with a display-name sentinel and an `EXM` block whose
/// final address entry is the SMTP alias.
pub fn parse_recipient_list(blob: &[u8]) -> Vec<RecipientEntry> {
    let mut starts = Vec::new();
    let mut search = 0;
    while let Some(at) = find_subsequence(&blob[search..], b"ProP") {
        starts.push(search + at);
        search += at + 4;
    }

    let mut recipients = Vec::new();
    for (index, &start) in starts.iter().enumerate() {
        let end = starts.get(index + 1).copied().unwrap_or(blob.len());
        let block = &blob[start..end];

        let name = discover_sentinel(block)
            .map(|(_, name, _)| name)
            .unwrap_or_default();
        let email = scan_m_entries(block)
            .into_iter()
            .map(|(_, payload)| payload)
            .filter(|payload| is_email(payload))
            .next_back()
            .unwrap_or_default();

        if !name.is_empty() || !email.is_empty() {
            recipients.push(RecipientEntry { name, email });
        }
    }
    recipients
}

/// Join tokenized `DisplayTo`/`DisplayCc`/`DisplayBcc` names against the
/// RecipientList map. Unmatched names keep an empty address.
pub fn match_recipients(display: &str, map: &[RecipientEntry]) -> Vec<(String, String)> {
    display
        .split([';', ','])
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            let email = map
                .iter()
                .find(|entry| entry.name.eq_ignore_ascii_case(name))
                .map(|entry| entry.email.clone())
                .unwrap_or_default();
            (name.to_string(), email)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlq() {
        assert_eq!(read_vlq(&[0x05]), Some((5, 1)));
        assert_eq!(read_vlq(&[0x7F]), Some((127, 1)));
        // 0x80 | 0x05, 0x01 -> 5 + (1 << 7) = 133
        assert_eq!(read_vlq(&[0x85, 0x01]), Some((133, 2)));
        assert_eq!(read_vlq(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]), None);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("JOHN DOE"), "John Doe");
        assert_eq!(title_case("МАША ИВАНОВА"), "Маша Иванова");
        assert_eq!(title_case("ADMINISTRATOR"), "Administrator");
    }

    #[test]
    fn test_plain_sentinel_blob() {
        // S2: uppercase name, M sentinel, one-byte length, UTF-8 subject.
        let info = parse_property_blob(b"\x01\x02JOHN DOEM\x06Hi all\x00");
        assert_eq!(info.sender_name, "John Doe");
        assert_eq!(info.subject, "Hi all");
    }

    #[test]
    fn test_wide_sentinel_blob() {
        // S3: Cyrillic name, I sentinel, length 4, UTF-16LE payload.
        let mut blob = "МАША ИВАНОВА".as_bytes().to_vec();
        blob.extend_from_slice(b"I\x04\x00");
        for unit in "Прив".encode_utf16() {
            blob.extend_from_slice(&unit.to_le_bytes());
        }
        let info = parse_property_blob(&blob);
        assert_eq!(info.subject, "Прив");
        assert_eq!(info.sender_name, "Маша Иванова");
    }

    #[test]
    fn test_legacy_dn_sender() {
        let mut blob = Vec::new();
        blob.extend_from_slice(
            b"/o=First Organization/ou=Exchange Administrative Group\
              /cn=Recipients/cn=9af72fd44bc8471bb2d62d27d8b34d33-ADMINISTRATOR\x00\x01",
        );
        blob.extend_from_slice(b"ADMINISTRATORM\x07Welcome");
        blob.extend_from_slice(b"\x02M\x15admin@lab.example.com");
        let info = parse_property_blob(&blob);
        assert_eq!(info.sender_name, "Administrator");
        assert_eq!(info.subject, "Welcome");
        assert_eq!(info.sender_email, "admin@lab.example.com");
    }

    #[test]
    fn test_truncated_name_falls_back_to_prefix() {
        let mut blob = Vec::new();
        blob.extend_from_slice(b"/cn=Recipients/cn=00000000000000000000000000000000-ADMINISTRATOR\x00");
        // Exchange truncated the sentinel name to ADMINIS.
        blob.extend_from_slice(b"\x01ADMINISM\x04Sale");
        let info = parse_property_blob(&blob);
        assert_eq!(info.sender_name, "Administrator");
        assert_eq!(info.subject, "Sale");
    }

    #[test]
    fn test_message_id() {
        let blob = b"\x00M\x19<abc123@mail.example.com> more";
        let info = parse_property_blob(blob);
        assert_eq!(info.message_id, "<abc123@mail.example.com>");
    }

    #[test]
    fn test_no_entries_is_empty_not_error() {
        let info = parse_property_blob(&[0x00, 0x01, 0x02, 0x03]);
        assert_eq!(info, PropertyBlobInfo::default());
    }

    #[test]
    fn test_recipient_list() {
        let mut blob = Vec::new();
        blob.extend_from_slice(b"ProP\x01JOHN DOEM\x08John DoeEXM\x10john@example.com");
        blob.extend_from_slice(b"ProP\x01JANE ROEM\x08Jane RoeEXM\x10jane@example.com");
        let recipients = parse_recipient_list(&blob);
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].name, "JOHN DOE");
        assert_eq!(recipients[0].email, "john@example.com");
        assert_eq!(recipients[1].email, "jane@example.com");
    }

    #[test]
    fn test_match_recipients_join() {
        let map = vec![
            RecipientEntry {
                name: "JOHN DOE".into(),
                email: "john@example.com".into(),
            },
            RecipientEntry {
                name: "JANE ROE".into(),
                email: "jane@example.com".into(),
            },
        ];
        let joined = match_recipients("John Doe; Jane Roe; Unknown Person", &map);
        assert_eq!(
            joined,
            vec![
                ("John Doe".into(), "john@example.com".into()),
                ("Jane Roe".into(), "jane@example.com".into()),
                ("Unknown Person".into(), String::new()),
            ]
        );
    }
}
