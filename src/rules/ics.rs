//! iCalendar export of computed deadlines.

use super::DeadlineResult;
use crate::determinism::sha256_hex;

/// Render one VEVENT per deadline inside a VCALENDAR wrapper.
///
/// DTSTART is localized with the pack's TZID; SUMMARY is
/// `"<jurisdiction>: <name>"`, DESCRIPTION carries the citation and
/// notes, and every event is categorized `Legal,Deadline`.
pub fn to_ics(results: &[DeadlineResult]) -> String {
    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//rexlit//deadline-calculator//EN".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
    ];
    for result in results {
        let dtstart = result.due.format("%Y%m%dT%H%M%S").to_string();
        let uid = sha256_hex(
            format!(
                "{}|{}|{}|{}",
                result.jurisdiction, result.event, result.name, dtstart
            )
            .as_bytes(),
        );
        let description = match &result.notes {
            Some(notes) => format!("{}\\n{}", escape(&result.cite), escape(notes)),
            None => escape(&result.cite),
        };
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:{}@rexlit", &uid[..32]));
        lines.push(format!("DTSTAMP:{}Z", dtstart));
        lines.push(format!("DTSTART;TZID={}:{}", result.timezone, dtstart));
        lines.push(format!(
            "SUMMARY:{}: {}",
            escape(&result.jurisdiction),
            escape(&result.name)
        ));
        lines.push(format!("DESCRIPTION:{}", description));
        lines.push("CATEGORIES:Legal,Deadline".to_string());
        lines.push("END:VEVENT".to_string());
    }
    lines.push("END:VCALENDAR".to_string());
    lines.join("\r\n") + "\r\n"
}

/// Escape text per RFC 5545: backslash, semicolon, comma, newline.
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
