//! Typed records extracted from an Exchange mailbox.

use chrono::{DateTime, Utc};

/// `PR_IMPORTANCE` levels.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

impl Importance {
    pub fn from_value(value: u64) -> Self {
        match value {
            0 => Importance::Low,
            2 => Importance::High,
            _ => Importance::Normal,
        }
    }

    pub fn to_value(self) -> i32 {
        match self {
            Importance::Low => 0,
            Importance::Normal => 1,
            Importance::High => 2,
        }
    }
}

/// A display name paired with an SMTP address; either may be empty.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct EmailAddress {
    pub name: String,
    pub email: String,
}

/// A message attachment. `data` is lazy: the reader materializes it from the
/// long-value store on first access or at export time.
#[derive(Clone, Default, Debug)]
pub struct Attachment {
    pub filename: String,
    pub content_type: Option<String>,
    pub size: u64,
    pub data: Option<Vec<u8>>,
    /// Inid joining this attachment to its `Attachment_XXX` row.
    pub inid: Option<u32>,
}

/// An email message assembled from a `Message_XXX` row.
#[derive(Clone, Default, Debug)]
pub struct EmailMessage {
    pub subject: String,
    pub sender_name: String,
    pub sender_email: String,
    pub recipients_to: Vec<EmailAddress>,
    pub recipients_cc: Vec<EmailAddress>,
    pub recipients_bcc: Vec<EmailAddress>,
    pub date_sent: Option<DateTime<Utc>>,
    pub date_received: Option<DateTime<Utc>>,
    pub message_id: String,
    pub importance: Importance,
    pub is_read: bool,
    pub is_hidden: bool,
    pub body_html: String,
    pub body_text: String,
    pub attachments: Vec<Attachment>,
    pub message_class: String,
    /// Row index within the message table; stable within a session.
    pub record_index: usize,
    /// 26-byte folder identifier.
    pub folder_id: Vec<u8>,
    /// U+FFFD substitutions made while decoding this record's fields.
    pub decode_replacements: usize,
}

impl EmailMessage {
    /// True once extraction found attachment rows; the column flag is
    /// advisory only.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Body text, deriving from HTML when no plain body was stored.
    pub fn effective_body_text(&self) -> String {
        if !self.body_text.is_empty() {
            return self.body_text.clone();
        }
        html_to_text(&self.body_html)
    }
}

/// Attendee participation, mapped to iCalendar PARTSTAT.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub enum PartStat {
    #[default]
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
}

impl PartStat {
    pub fn as_ics(self) -> &'static str {
        match self {
            PartStat::NeedsAction => "NEEDS-ACTION",
            PartStat::Accepted => "ACCEPTED",
            PartStat::Declined => "DECLINED",
            PartStat::Tentative => "TENTATIVE",
        }
    }
}

#[derive(Clone, Default, Debug)]
pub struct Attendee {
    pub name: String,
    pub email: String,
    pub status: PartStat,
}

/// A calendar entry derived from an `IPM.Appointment` or
/// `IPM.Schedule.Meeting.*` row.
#[derive(Clone, Default, Debug)]
pub struct CalendarEvent {
    pub subject: String,
    pub organizer: EmailAddress,
    pub attendees: Vec<Attendee>,
    pub location: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub body: String,
    pub uid: String,
}

#[derive(Clone, Default, Debug)]
pub struct Phone {
    pub kind: String,
    pub value: String,
}

#[derive(Clone, Default, Debug)]
pub struct Address {
    pub kind: String,
    pub value: String,
}

/// A contact derived from an `IPM.Contact` row.
#[derive(Clone, Default, Debug)]
pub struct Contact {
    pub display_name: String,
    pub emails: Vec<String>,
    pub phones: Vec<Phone>,
    pub company: String,
    pub title: String,
    pub addresses: Vec<Address>,
}

/// Special folder numbers from the `SpecialFolderNumber` column.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SpecialFolder {
    Root = 1,
    IpmSubtree = 9,
    Inbox = 10,
    Outbox = 11,
    SentItems = 12,
    DeletedItems = 13,
    Contacts = 14,
    Calendar = 15,
    Drafts = 16,
    Journal = 17,
    Notes = 18,
    Tasks = 19,
    RecoverableItems = 20,
    RecoverableDeletions = 21,
    RecoverableVersions = 22,
}

impl SpecialFolder {
    pub fn from_number(number: u64) -> Option<Self> {
        Some(match number {
            1 => SpecialFolder::Root,
            9 => SpecialFolder::IpmSubtree,
            10 => SpecialFolder::Inbox,
            11 => SpecialFolder::Outbox,
            12 => SpecialFolder::SentItems,
            13 => SpecialFolder::DeletedItems,
            14 => SpecialFolder::Contacts,
            15 => SpecialFolder::Calendar,
            16 => SpecialFolder::Drafts,
            17 => SpecialFolder::Journal,
            18 => SpecialFolder::Notes,
            19 => SpecialFolder::Tasks,
            20 => SpecialFolder::RecoverableItems,
            21 => SpecialFolder::RecoverableDeletions,
            22 => SpecialFolder::RecoverableVersions,
            _ => return None,
        })
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SpecialFolder::Root => "Root",
            SpecialFolder::IpmSubtree => "Top of Information Store",
            SpecialFolder::Inbox => "Inbox",
            SpecialFolder::Outbox => "Outbox",
            SpecialFolder::SentItems => "Sent Items",
            SpecialFolder::DeletedItems => "Deleted Items",
            SpecialFolder::Contacts => "Contacts",
            SpecialFolder::Calendar => "Calendar",
            SpecialFolder::Drafts => "Drafts",
            SpecialFolder::Journal => "Journal",
            SpecialFolder::Notes => "Notes",
            SpecialFolder::Tasks => "Tasks",
            SpecialFolder::RecoverableItems => "Recoverable Items",
            SpecialFolder::RecoverableDeletions => "Deletions",
            SpecialFolder::RecoverableVersions => "Versions",
        }
    }
}

/// A mailbox folder. Folders form an arena indexed by [`FolderIndex`];
/// parent/child links are indices, never owning references.
#[derive(Clone, Default, Debug)]
pub struct Folder {
    /// 26-byte folder identifier.
    pub folder_id: Vec<u8>,
    /// Parent identifier; equals `folder_id` for the root.
    pub parent_id: Vec<u8>,
    pub display_name: String,
    pub special: Option<SpecialFolder>,
    pub message_count: u64,
}

pub type FolderIndex = usize;

/// A mailbox row from the `Mailbox` table.
#[derive(Clone, Default, Debug)]
pub struct Mailbox {
    pub mailbox_number: u64,
    pub guid: Vec<u8>,
    pub owner_display_name: String,
    pub message_count: u64,
    pub last_logon: Option<DateTime<Utc>>,
}

/// Which entity a MessageClass maps to.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RecordKind {
    Email,
    Calendar,
    Contact,
}

/// Dispatch on the MessageClass prefix. Unknown classes stay emails with the
/// class preserved.
pub fn classify(message_class: &str) -> RecordKind {
    if message_class.starts_with("IPM.Appointment")
        || message_class.starts_with("IPM.Schedule.Meeting")
    {
        RecordKind::Calendar
    } else if message_class.starts_with("IPM.Contact") {
        RecordKind::Contact
    } else {
        RecordKind::Email
    }
}

/// The extracted record sum type.
#[derive(Clone, Debug)]
pub enum Record {
    Email(Box<EmailMessage>),
    Calendar(Box<CalendarEvent>),
    Contact(Box<Contact>),
}

impl Record {
    /// Build the typed record for an assembled message row.
    pub fn from_email(email: EmailMessage) -> Record {
        match classify(&email.message_class) {
            RecordKind::Email => Record::Email(Box::new(email)),
            RecordKind::Calendar => {
                let attendees = email
                    .recipients_to
                    .iter()
                    .chain(email.recipients_cc.iter())
                    .map(|address| Attendee {
                        name: address.name.clone(),
                        email: address.email.clone(),
                        status: PartStat::NeedsAction,
                    })
                    .collect();
                Record::Calendar(Box::new(CalendarEvent {
                    subject: email.subject.clone(),
                    organizer: EmailAddress {
                        name: email.sender_name.clone(),
                        email: email.sender_email.clone(),
                    },
                    attendees,
                    location: String::new(),
                    start: email.date_sent,
                    end: email.date_sent,
                    all_day: false,
                    body: email.effective_body_text(),
                    uid: email.message_id.clone(),
                }))
            }
            RecordKind::Contact => {
                let mut emails: Vec<String> = Vec::new();
                if !email.sender_email.is_empty() {
                    emails.push(email.sender_email.clone());
                }
                emails.extend(
                    email
                        .recipients_to
                        .iter()
                        .filter(|address| !address.email.is_empty())
                        .map(|address| address.email.clone()),
                );
                let display_name = if email.sender_name.is_empty() {
                    email.subject.clone()
                } else {
                    email.sender_name.clone()
                };
                Record::Contact(Box::new(Contact {
                    display_name,
                    emails,
                    phones: Vec::new(),
                    company: String::new(),
                    title: String::new(),
                    addresses: Vec::new(),
                }))
            }
        }
    }
}

/// Extract visible text from HTML: drop `<script>`/`<style>`/comments, take
/// text between tags.
pub fn html_to_text(html: &str) -> String {
    let stripped = strip_sections(html);

    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_tag = false;
    for c in stripped.chars() {
        match c {
            '<' => {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
                current.clear();
                in_tag = true;
            }
            '>' => in_tag = false,
            _ if !in_tag => current.push(c),
            _ => {}
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
    parts.join("\n")
}

fn starts_with_ci(bytes: &[u8], needle: &[u8]) -> bool {
    bytes.len() >= needle.len() && bytes[..needle.len()].eq_ignore_ascii_case(needle)
}

fn find_ci(bytes: &[u8], needle: &[u8]) -> Option<usize> {
    if bytes.len() < needle.len() {
        return None;
    }
    (0..=bytes.len() - needle.len()).find(|&at| starts_with_ci(&bytes[at..], needle))
}

/// Remove script/style elements and comments without regular expressions.
fn strip_sections(html: &str) -> String {
    let bytes = html.as_bytes();
    let mut output = String::with_capacity(html.len());
    let mut index = 0;

    while index < bytes.len() {
        let rest = &bytes[index..];
        let skip_to = if starts_with_ci(rest, b"<script") {
            find_ci(rest, b"</script>").map(|end| index + end + 9)
        } else if starts_with_ci(rest, b"<style") {
            find_ci(rest, b"</style>").map(|end| index + end + 8)
        } else if rest.starts_with(b"<!--") {
            find_ci(rest, b"-->").map(|end| index + end + 3)
        } else {
            None
        };

        match skip_to {
            Some(end) => index = end.min(bytes.len()),
            None => {
                // Advance one whole character.
                let mut next = index + 1;
                while next < bytes.len() && (bytes[next] & 0xC0) == 0x80 {
                    next += 1;
                }
                output.push_str(&html[index..next]);
                index = next;
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(classify("IPM.Note"), RecordKind::Email);
        assert_eq!(classify("IPM.Appointment"), RecordKind::Calendar);
        assert_eq!(classify("IPM.Schedule.Meeting.Request"), RecordKind::Calendar);
        assert_eq!(classify("IPM.Contact"), RecordKind::Contact);
        assert_eq!(classify("IPM.Task"), RecordKind::Email);
        assert_eq!(classify("REPORT.IPM.Note.NDR"), RecordKind::Email);
    }

    #[test]
    fn test_special_folder_mapping() {
        assert_eq!(SpecialFolder::from_number(10), Some(SpecialFolder::Inbox));
        assert_eq!(SpecialFolder::from_number(15), Some(SpecialFolder::Calendar));
        assert_eq!(SpecialFolder::from_number(2), None);
        assert_eq!(SpecialFolder::Inbox.display_name(), "Inbox");
    }

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><style>p{color:red}</style></head>\
                    <body><p>Hello</p><!-- note --><script>alert(1)</script>\
                    <div>World</div></body></html>";
        assert_eq!(html_to_text(html), "Hello\nWorld");
    }

    #[test]
    fn test_effective_body_prefers_plain() {
        let mut email = EmailMessage {
            body_text: "plain".into(),
            body_html: "<p>html</p>".into(),
            ..Default::default()
        };
        assert_eq!(email.effective_body_text(), "plain");
        email.body_text.clear();
        assert_eq!(email.effective_body_text(), "html");
    }

    #[test]
    fn test_calendar_record_from_meeting() {
        let email = EmailMessage {
            subject: "Standup".into(),
            message_class: "IPM.Appointment".into(),
            sender_name: "Organizer".into(),
            sender_email: "org@example.com".into(),
            recipients_to: vec![EmailAddress {
                name: "A".into(),
                email: "a@example.com".into(),
            }],
            ..Default::default()
        };
        let Record::Calendar(event) = Record::from_email(email) else {
            panic!("appointment should map to a calendar record");
        };
        assert_eq!(event.subject, "Standup");
        assert_eq!(event.organizer.email, "org@example.com");
        assert_eq!(event.attendees.len(), 1);
    }
}
