//! Core types for the daily classification pipeline.
//!
//! These types model one partition's lifecycle:
//! Raw line → MessageEvent → Sanitized event → Conversation → Classification → Metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ClassifierMode, StorageType};

/// Team assigned to conversations whose first turn carries no team.
pub const UNKNOWN_TEAM: &str = "Unknown";

// ═══════════════════════════════════════════
// Message events
// ═══════════════════════════════════════════

/// Author role of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub use super::sanitize::SanitizedText;

/// One validated message event.
///
/// `T` is the text representation: `String` straight out of ingestion,
/// `SanitizedText` once the sanitizer has run. Serialized with the landing
/// file key names so a sanitized dump has the same shape as its input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageEvent<T = String> {
    #[serde(rename = "event_time")]
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    #[serde(rename = "message_id", skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub role: Role,
    #[serde(rename = "content")]
    pub text: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

pub type RawEvent = MessageEvent<String>;
pub type SanitizedEvent = MessageEvent<SanitizedText>;

impl<T> MessageEvent<T> {
    /// Rebuild the event around different text, keeping every other field.
    pub fn with_text<U>(self, text: U) -> MessageEvent<U> {
        MessageEvent {
            timestamp: self.timestamp,
            conversation_id: self.conversation_id,
            event_id: self.event_id,
            role: self.role,
            text,
            team: self.team,
            user_id: self.user_id,
        }
    }
}

// ═══════════════════════════════════════════
// Conversations (output of the assembler)
// ═══════════════════════════════════════════

/// Turns of one conversation, ordered by timestamp (stable on ties).
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub conversation_id: String,
    pub team: String,
    pub turns: Vec<SanitizedEvent>,
}

impl Conversation {
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn chars_for(&self, role: Role) -> usize {
        self.turns
            .iter()
            .filter(|t| t.role == role)
            .map(|t| t.text.char_count())
            .sum()
    }
}

// ═══════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════

/// Task category assigned to one conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub conversation_id: String,
    pub label: String,
    pub confidence: f64,
    pub reason: String,
}

/// What a classifier produced for one conversation, including whether it
/// had to fall back.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutcome {
    pub result: ClassificationResult,
    /// Set when the result is a fallback after a failed inference.
    pub failure: Option<String>,
    /// Inference attempts made (0 for bypass).
    pub attempts: u32,
}

impl ClassificationOutcome {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// A conversation joined with its classification.
#[derive(Debug, Clone)]
pub struct ClassifiedConversation {
    pub conversation: Conversation,
    pub outcome: ClassificationOutcome,
}

impl ClassifiedConversation {
    pub fn label(&self) -> &str {
        &self.outcome.result.label
    }
}

// ═══════════════════════════════════════════
// Metrics (output of the aggregator)
// ═══════════════════════════════════════════

/// Metrics for one (team, task category) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMetric {
    pub team: String,
    pub task_category: String,
    pub conversation_count: u64,
    pub total_turns: u64,
    pub avg_turns: f64,
    pub avg_chars_user: f64,
    pub total_chars_user: u64,
    pub total_chars_assistant: u64,
    pub avg_chars_assistant: f64,
}

/// The persisted metrics document for one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMetrics {
    pub date: String,
    pub total_conversations: u64,
    pub total_events_processed: u64,
    pub metrics: Vec<CategoryMetric>,
}

// ═══════════════════════════════════════════
// Run report
// ═══════════════════════════════════════════

/// Redaction counters, additive across events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RedactionStats {
    #[serde(rename = "emails_redacted")]
    pub emails: u64,
    #[serde(rename = "phones_redacted")]
    pub phones: u64,
    #[serde(rename = "urls_redacted")]
    pub urls: u64,
    pub total_redactions: u64,
}

impl RedactionStats {
    pub fn new(emails: u64, phones: u64, urls: u64) -> Self {
        Self {
            emails,
            phones,
            urls,
            total_redactions: emails + phones + urls,
        }
    }

    pub fn add(&mut self, other: RedactionStats) {
        self.emails += other.emails;
        self.phones += other.phones;
        self.urls += other.urls;
        self.total_redactions = self.emails + self.phones + self.urls;
    }

    pub fn is_empty(&self) -> bool {
        self.total_redactions == 0
    }
}

/// Pipeline stage an error descriptor originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Classify,
    Output,
}

/// One entry in the run report's append-only error list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDescriptor {
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ErrorDescriptor {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            key: None,
            line: None,
            conversation_id: None,
        }
    }

    pub fn at(mut self, key: &str, line: Option<u64>) -> Self {
        self.key = Some(key.to_string());
        self.line = line;
        self
    }

    pub fn for_conversation(mut self, conversation_id: &str) -> Self {
        self.conversation_id = Some(conversation_id.to_string());
        self
    }
}

/// End-of-run accounting for one partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub date: String,
    pub storage_type: StorageType,
    pub classifier_mode: ClassifierMode,
    pub input_files_count: u64,
    pub events_read: u64,
    pub events_valid: u64,
    #[serde(rename = "events_invalid")]
    pub invalid_events: u64,
    pub conversations_assembled: u64,
    pub conversations_classified: u64,
    pub classification_failures: u64,
    pub redaction_stats: RedactionStats,
    pub metrics_written: bool,
    pub sanitized_written: bool,
    pub duration_seconds: f64,
    pub errors: Vec<ErrorDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sanitize::sanitize_text;
    use chrono::TimeZone;

    fn event(role: Role, text: &str) -> SanitizedEvent {
        MessageEvent {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 3, 10, 0, 0).unwrap(),
            conversation_id: "c1".into(),
            event_id: Some("m1".into()),
            role,
            text: sanitize_text(text).0,
            team: Some("Sales".into()),
            user_id: None,
        }
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("User"), None);
    }

    #[test]
    fn sanitized_event_serializes_with_landing_keys() {
        let json = serde_json::to_value(event(Role::User, "hi")).unwrap();
        assert_eq!(json["event_time"], "2026-01-03T10:00:00Z");
        assert_eq!(json["message_id"], "m1");
        assert_eq!(json["content"], "hi");
        assert_eq!(json["role"], "user");
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn conversation_counts_chars_per_role() {
        let conv = Conversation {
            conversation_id: "c1".into(),
            team: "Sales".into(),
            turns: vec![
                event(Role::User, "héllo"),
                event(Role::Assistant, "hi there"),
                event(Role::User, "ok"),
            ],
        };
        assert_eq!(conv.turn_count(), 3);
        assert_eq!(conv.chars_for(Role::User), 7);
        assert_eq!(conv.chars_for(Role::Assistant), 8);
        assert_eq!(conv.chars_for(Role::System), 0);
    }

    #[test]
    fn redaction_stats_accumulate() {
        let mut stats = RedactionStats::default();
        assert!(stats.is_empty());
        stats.add(RedactionStats::new(1, 0, 2));
        stats.add(RedactionStats::new(1, 1, 0));
        assert_eq!(stats, RedactionStats::new(2, 1, 2));
        assert_eq!(stats.total_redactions, 5);

        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["emails_redacted"], 2);
        assert_eq!(json["phones_redacted"], 1);
        assert_eq!(json["urls_redacted"], 2);
    }

    #[test]
    fn error_descriptor_omits_empty_locations() {
        let json = serde_json::to_value(ErrorDescriptor::new(Stage::Output, "boom")).unwrap();
        assert_eq!(json["stage"], "output");
        assert!(json.get("key").is_none());

        let located = ErrorDescriptor::new(Stage::Ingest, "bad").at("landing/x.jsonl", Some(3));
        let json = serde_json::to_value(located).unwrap();
        assert_eq!(json["key"], "landing/x.jsonl");
        assert_eq!(json["line"], 3);
    }
}
