//! RFC 822 message → [`Item`] conversion helpers.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use mail_parser::{HeaderName, MessageParser, MimeHeaders};

use crate::pipeline::types::Item;

/// Placeholder body when no readable part exists.
pub const NO_READABLE_CONTENT: &str = "";

/// Parse a raw message into an [`Item`] keyed by `uid`.
///
/// Returns `None` when the bytes are not a parseable message.
pub fn parse_message(uid: &str, raw: &[u8]) -> Option<Item> {
    let parsed = MessageParser::default().parse(raw)?;

    let sender = extract_sender(&parsed);
    let body = extract_text(&parsed);
    let received_ts = extract_date(&parsed);
    let received_at = parsed
        .header_raw(HeaderName::Date)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("Unknown")
        .to_string();

    let mut item = Item::new(uid, sender)
        .with_subject(parsed.subject().unwrap_or_default())
        .with_body(body)
        .with_received(received_at, received_ts);

    if let Some(id) = parsed.message_id() {
        item = item.with_message_id(id);
    }

    Some(item)
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Extract readable text: plain part, then stripped HTML, then a text attachment.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.trim().to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            let name = MimeHeaders::attachment_name(part).unwrap_or("file");
            return format!("[Attachment: {name}]\n{text}");
        }
    }
    NO_READABLE_CONTENT.to_string()
}

/// Convert the Date header into UTC, honoring its zone offset.
fn extract_date(parsed: &mail_parser::Message) -> Option<DateTime<Utc>> {
    let d = parsed.date()?;
    let naive = NaiveDate::from_ymd_opt(d.year as i32, u32::from(d.month), u32::from(d.day))?
        .and_hms_opt(u32::from(d.hour), u32::from(d.minute), u32::from(d.second))?;
    let offset = ChronoDuration::minutes(i64::from(d.tz_hour) * 60 + i64::from(d.tz_minute));
    let utc = if d.tz_before_gmt {
        naive + offset
    } else {
        naive - offset
    };
    Some(utc.and_utc())
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip quoted reply text from an email body.
///
/// Drops `>` lines and everything after an "On ... wrote:" attribution or an
/// "--- Original Message ---" separator.
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }
        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }
        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::DEFAULT_SUBJECT;

    const PLAIN: &str = "From: Alice <alice@example.com>\r\n\
To: me@example.com\r\n\
Subject: Quarterly numbers\r\n\
Date: Tue, 14 Jan 2025 10:30:00 +0200\r\n\
Message-ID: <abc123@example.com>\r\n\
\r\n\
Please review the attached report by Friday.\r\n";

    #[test]
    fn parses_plain_message() {
        let item = parse_message("42", PLAIN.as_bytes()).unwrap();
        assert_eq!(item.id, "42");
        assert_eq!(item.sender, "alice@example.com");
        assert_eq!(item.subject, "Quarterly numbers");
        assert_eq!(item.message_id, "abc123@example.com");
        assert!(item.body.contains("review the attached report"));
        assert!(item.summary.is_none());
    }

    #[test]
    fn date_converted_to_utc() {
        let item = parse_message("1", PLAIN.as_bytes()).unwrap();
        let ts = item.received_ts.unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-14T08:30:00+00:00");
        assert_eq!(item.received_at, "Tue, 14 Jan 2025 10:30:00 +0200");
    }

    #[test]
    fn date_header_kept_as_sent() {
        let raw = "From: d@example.com\r\n\
Subject: zone\r\n\
Date: Tue, 14 Jan 2025 08:30:00 -0500\r\n\
\r\n\
body\r\n";
        let item = parse_message("4", raw.as_bytes()).unwrap();
        assert_eq!(item.received_at, "Tue, 14 Jan 2025 08:30:00 -0500");
        assert_eq!(
            item.received_ts.unwrap().to_rfc3339(),
            "2025-01-14T13:30:00+00:00"
        );
    }

    #[test]
    fn unparsable_date_header_still_passed_through() {
        let raw = "From: e@example.com\r\n\
Date: sometime last week\r\n\
\r\n\
body\r\n";
        let item = parse_message("5", raw.as_bytes()).unwrap();
        assert_eq!(item.received_at, "sometime last week");
        assert!(item.received_ts.is_none());
    }

    #[test]
    fn missing_subject_defaults() {
        let raw = "From: bob@example.com\r\n\r\nhi\r\n";
        let item = parse_message("2", raw.as_bytes()).unwrap();
        assert_eq!(item.subject, DEFAULT_SUBJECT);
        assert_eq!(item.received_at, "Unknown");
        assert!(item.message_id.starts_with("gen-"));
    }

    #[test]
    fn html_only_body_is_stripped() {
        let raw = "From: c@example.com\r\n\
Subject: html\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><body><p>Hello <b>there</b></p></body></html>\r\n";
        let item = parse_message("3", raw.as_bytes()).unwrap();
        assert!(item.body.contains("Hello"));
        assert!(!item.body.contains('<'));
    }

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
        assert_eq!(strip_html("<p>  Hello   World  </p>"), "Hello World");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn strip_quoted_lines_and_attribution() {
        let body = "Sounds good!\n> old\n\nOn Mon, Jan 1, 2026 at 10:00 AM Alice wrote:\n> more";
        assert_eq!(strip_quoted_text(body), "Sounds good!");
    }

    #[test]
    fn strip_original_message_separator() {
        let body = "My reply\n\n--- Original Message ---\nOld stuff here";
        assert_eq!(strip_quoted_text(body), "My reply");
    }

    #[test]
    fn strip_no_quotes_passthrough() {
        let body = "Just a normal message\nWith multiple lines";
        assert_eq!(strip_quoted_text(body), body);
    }
}
