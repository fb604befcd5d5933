//! iCalendar (RFC 5545) emission of calendar events.

use chrono::{DateTime, Utc};

use crate::model::CalendarEvent;

/// Escape TEXT values: backslash, comma, semicolon and newlines.
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

/// UTC timestamp with `Z` suffix.
fn format_utc(time: DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Fold a content line at 75 octets with a continuation space.
fn fold_line(line: &str, out: &mut String) {
    let bytes = line.as_bytes();
    if bytes.len() <= 75 {
        out.push_str(line);
        out.push_str("\r\n");
        return;
    }

    let mut start = 0;
    let mut first = true;
    while start < bytes.len() {
        let limit = if first { 75 } else { 74 };
        let mut end = (start + limit).min(bytes.len());
        // Do not split inside a UTF-8 sequence.
        while end < bytes.len() && (bytes[end] & 0xC0) == 0x80 {
            end -= 1;
        }
        if !first {
            out.push(' ');
        }
        out.push_str(&line[start..end]);
        out.push_str("\r\n");
        start = end;
        first = false;
    }
}

fn property(name: &str, value: &str, out: &mut String) {
    fold_line(&format!("{name}:{value}"), out);
}

/// Serialize events as one VCALENDAR document.
pub fn format_ics(events: &[CalendarEvent]) -> String {
    let mut out = String::new();
    property("BEGIN", "VCALENDAR", &mut out);
    property("VERSION", "2.0", &mut out);
    property("PRODID", "-//EDB-Exporter//EN", &mut out);

    for event in events {
        property("BEGIN", "VEVENT", &mut out);
        if !event.uid.is_empty() {
            property("UID", &escape_text(&event.uid), &mut out);
        }
        if let Some(start) = event.start {
            property("DTSTAMP", &format_utc(start), &mut out);
            property("DTSTART", &format_utc(start), &mut out);
        }
        if let Some(end) = event.end {
            property("DTEND", &format_utc(end), &mut out);
        }
        property("SUMMARY", &escape_text(&event.subject), &mut out);
        if !event.body.is_empty() {
            property("DESCRIPTION", &escape_text(&event.body), &mut out);
        }
        if !event.location.is_empty() {
            property("LOCATION", &escape_text(&event.location), &mut out);
        }
        if !event.organizer.email.is_empty() {
            fold_line(
                &format!(
                    "ORGANIZER;CN={}:MAILTO:{}",
                    escape_text(&event.organizer.name),
                    event.organizer.email
                ),
                &mut out,
            );
        }
        for attendee in &event.attendees {
            fold_line(
                &format!(
                    "ATTENDEE;CN={};PARTSTAT={}:MAILTO:{}",
                    escape_text(&attendee.name),
                    attendee.status.as_ics(),
                    attendee.email
                ),
                &mut out,
            );
        }
        property("END", "VEVENT", &mut out);
    }

    property("END", "VCALENDAR", &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attendee, EmailAddress, PartStat};
    use chrono::TimeZone;

    #[test]
    fn test_minimal_calendar() {
        let event = CalendarEvent {
            subject: "Standup; daily".into(),
            uid: "<meet@x.test>".into(),
            start: Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).single(),
            end: Utc.with_ymd_and_hms(2024, 7, 1, 9, 30, 0).single(),
            organizer: EmailAddress {
                name: "Org".into(),
                email: "org@x.test".into(),
            },
            attendees: vec![Attendee {
                name: "A".into(),
                email: "a@x.test".into(),
                status: PartStat::Accepted,
            }],
            ..Default::default()
        };

        let ics = format_ics(&[event]);
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("PRODID:-//EDB-Exporter//EN\r\n"));
        assert!(ics.contains("DTSTART:20240701T090000Z\r\n"));
        assert!(ics.contains("DTEND:20240701T093000Z\r\n"));
        assert!(ics.contains("SUMMARY:Standup\\; daily\r\n"));
        assert!(ics.contains("ORGANIZER;CN=Org:MAILTO:org@x.test\r\n"));
        assert!(ics.contains("ATTENDEE;CN=A;PARTSTAT=ACCEPTED:MAILTO:a@x.test\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn test_long_line_folding() {
        let event = CalendarEvent {
            subject: "x".repeat(200),
            ..Default::default()
        };
        let ics = format_ics(&[event]);
        for line in ics.lines() {
            assert!(line.len() <= 76, "line too long: {}", line.len());
        }
        // The folded summary reassembles.
        let unfolded = ics.replace("\r\n ", "");
        assert!(unfolded.contains(&format!("SUMMARY:{}", "x".repeat(200))));
    }
}
