//! PII redaction for message text.
//!
//! Three ordered pattern passes (emails, then phones, then URLs), each match
//! replaced by a fixed token. A replacement can expose a new match next to
//! its token, e.g. the front half of a 20-digit run or a number glued to a
//! URL, so the passes repeat until a whole round redacts nothing. The result
//! is a fixpoint: sanitizing it again changes nothing.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::types::{RawEvent, RedactionStats, SanitizedEvent};

pub const EMAIL_TOKEN: &str = "[EMAIL_REDACTED]";
pub const PHONE_TOKEN: &str = "[PHONE_REDACTED]";
pub const URL_TOKEN: &str = "[URL_REDACTED]";

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b")
        .expect("email pattern is valid")
});

// (123) 456-7890, 123-456-7890, 123.456.7890, +1-123-456-7890
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b")
        .expect("phone pattern is valid")
});

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"https?://(?:www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b(?:[-a-zA-Z0-9()@:%_\+.~#?&/=]*)",
    )
    .expect("url pattern is valid")
});

/// Text that has passed through the redaction rules.
///
/// The constructor is private to this module, so every value comes out of
/// [`sanitize_text`] and is free of the PII categories it knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SanitizedText(String);

impl SanitizedText {
    fn from_redacted(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in Unicode scalar values.
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

impl AsRef<str> for SanitizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SanitizedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace every match of `pattern` with `token`, returning the match count.
fn redact(text: String, pattern: &Regex, token: &str) -> (String, u64) {
    let count = pattern.find_iter(&text).count() as u64;
    if count == 0 {
        return (text, 0);
    }
    (pattern.replace_all(&text, token).into_owned(), count)
}

/// Redact one piece of text.
pub fn sanitize_text(text: &str) -> (SanitizedText, RedactionStats) {
    let mut text = text.to_string();
    let mut totals = RedactionStats::default();

    // Every match consumes digits, an '@' or a URL scheme, none of which
    // appear in the tokens, so each round shrinks the input and this ends.
    loop {
        let (redacted, emails) = redact(text, &EMAIL_PATTERN, EMAIL_TOKEN);
        let (redacted, phones) = redact(redacted, &PHONE_PATTERN, PHONE_TOKEN);
        let (redacted, urls) = redact(redacted, &URL_PATTERN, URL_TOKEN);
        text = redacted;

        let round = RedactionStats::new(emails, phones, urls);
        if round.is_empty() {
            break;
        }
        totals.add(round);
    }

    (SanitizedText::from_redacted(text), totals)
}

pub fn sanitize_event(event: RawEvent) -> (SanitizedEvent, RedactionStats) {
    let (text, stats) = sanitize_text(&event.text);
    (event.with_text(text), stats)
}

/// Redact a batch, summing the counters across all events.
pub fn sanitize_events(events: Vec<RawEvent>) -> (Vec<SanitizedEvent>, RedactionStats) {
    let mut totals = RedactionStats::default();
    let sanitized = events
        .into_iter()
        .map(|event| {
            let (event, stats) = sanitize_event(event);
            totals.add(stats);
            event
        })
        .collect();

    tracing::debug!(
        emails = totals.emails,
        phones = totals.phones,
        urls = totals.urls,
        "Sanitization complete"
    );
    (sanitized, totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{MessageEvent, Role};
    use chrono::{TimeZone, Utc};

    fn raw(text: &str) -> RawEvent {
        MessageEvent {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 3, 10, 0, 0).unwrap(),
            conversation_id: "conv_1".into(),
            event_id: Some("msg_1".into()),
            role: Role::User,
            text: text.into(),
            team: Some("Sales".into()),
            user_id: Some("u_123".into()),
        }
    }

    #[test]
    fn redacts_emails() {
        let (text, stats) = sanitize_text("Contact me at john.doe@example.com or jane@company.org");
        assert_eq!(
            text.as_str(),
            "Contact me at [EMAIL_REDACTED] or [EMAIL_REDACTED]"
        );
        assert_eq!(stats, RedactionStats::new(2, 0, 0));
    }

    #[test]
    fn redacts_common_phone_formats() {
        let (text, stats) =
            sanitize_text("Call (123) 456-7890 or 987-654-3210 or 555.123.4567 or +1-555-123-4567");
        assert!(!text.as_str().contains("456-7890"));
        assert!(!text.as_str().contains("987-654-3210"));
        assert!(!text.as_str().contains("555.123.4567"));
        assert!(!text.as_str().contains("555-123-4567"));
        assert_eq!(stats.phones, 4);
        assert_eq!(stats.emails, 0);
    }

    #[test]
    fn redacts_urls() {
        let (text, stats) =
            sanitize_text("Visit https://www.example.com or http://test.org/path?query=1 today");
        assert_eq!(text.as_str(), "Visit [URL_REDACTED] or [URL_REDACTED] today");
        assert_eq!(stats.urls, 2);
    }

    #[test]
    fn mixed_text_counts_each_category() {
        let (text, stats) = sanitize_text(
            "Contact john@example.com at 555-123-4567 or visit https://example.com for more info",
        );
        assert_eq!(
            text.as_str(),
            "Contact [EMAIL_REDACTED] at [PHONE_REDACTED] or visit [URL_REDACTED] for more info"
        );
        assert_eq!(stats, RedactionStats::new(1, 1, 1));
        assert_eq!(stats.total_redactions, 3);
    }

    #[test]
    fn clean_text_is_untouched() {
        let input = "This is a normal message with no sensitive data";
        let (text, stats) = sanitize_text(input);
        assert_eq!(text.as_str(), input);
        assert!(stats.is_empty());
    }

    #[test]
    fn sanitizing_twice_changes_nothing() {
        let inputs = [
            "mail a.b@c.io, call +44 208-555-1234, see https://docs.internal.example/x?y=1",
            "plain",
            "",
            "nested https://a.example.com/u?email=x@y.com",
            "order ref 55512345675551234567 thanks",
            "ids 1234567890123 and 555-123-45675551234567",
            "5551234567https://example.com/a",
            "[PHONE_REDACTED]5551234567 and 5551234567[EMAIL_REDACTED]",
            "x@y.com5551234567",
        ];
        for input in inputs {
            let (once, _) = sanitize_text(input);
            let (twice, stats) = sanitize_text(once.as_str());
            assert_eq!(once, twice, "input: {input}");
            assert!(stats.is_empty(), "input: {input}");
        }
    }

    #[test]
    fn long_digit_runs_leave_no_phone_behind() {
        let (text, stats) = sanitize_text("order ref 55512345675551234567 thanks");
        assert_eq!(text.as_str(), "order ref [PHONE_REDACTED][PHONE_REDACTED] thanks");
        assert_eq!(stats.phones, 2);
        assert_eq!(stats.total_redactions, 2);
    }

    #[test]
    fn number_glued_to_url_is_redacted() {
        let (text, stats) = sanitize_text("call 5551234567https://example.com/a now");
        assert_eq!(text.as_str(), "call [PHONE_REDACTED][URL_REDACTED] now");
        assert_eq!(stats, RedactionStats::new(0, 1, 1));
    }

    #[test]
    fn event_keeps_metadata() {
        let (event, stats) = sanitize_event(raw("Email me at user@example.com"));
        assert_eq!(event.text.as_str(), "Email me at [EMAIL_REDACTED]");
        assert_eq!(event.conversation_id, "conv_1");
        assert_eq!(event.event_id.as_deref(), Some("msg_1"));
        assert_eq!(event.team.as_deref(), Some("Sales"));
        assert_eq!(stats.emails, 1);
    }

    #[test]
    fn batch_counts_are_additive() {
        let (events, stats) = sanitize_events(vec![
            raw("alice@test.com"),
            raw("bob@test.com and 123-456-7890"),
            raw("nothing here"),
        ]);
        assert_eq!(events.len(), 3);
        assert_eq!(stats, RedactionStats::new(2, 1, 0));
    }
}
