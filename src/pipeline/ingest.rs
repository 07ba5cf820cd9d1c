//! Ingestion of one landing partition.
//!
//! Every line of every source under `landing/date=D/` is parsed on its own.
//! A bad line is counted and described, then skipped; a source that cannot
//! be read is described and skipped. Only an empty partition stops the run.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use super::types::{ErrorDescriptor, MessageEvent, RawEvent, Role, Stage};
use super::PipelineError;
use crate::storage::{self, StorageBackend, StorageError};

/// Why a single record was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Malformed JSON: {0}")]
    Malformed(String),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Unparsable timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Unknown role '{0}'")]
    UnknownRole(String),

    #[error("Line is not valid UTF-8")]
    InvalidText,
}

/// Landing-file record. Every field is optional here so that missing
/// fields are reported by name instead of as a generic decode error.
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(alias = "timestamp")]
    event_time: Option<String>,
    conversation_id: Option<String>,
    #[serde(alias = "event_id")]
    message_id: Option<String>,
    role: Option<String>,
    #[serde(alias = "text")]
    content: Option<String>,
    team: Option<String>,
    user_id: Option<String>,
}

/// Parse one JSONL record into a validated event.
pub fn parse_record(line: &str) -> Result<RawEvent, RecordError> {
    let wire: WireEvent =
        serde_json::from_str(line).map_err(|e| RecordError::Malformed(e.to_string()))?;

    let conversation_id = wire
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(RecordError::MissingField("conversation_id"))?;
    let raw_time = wire
        .event_time
        .ok_or(RecordError::MissingField("event_time"))?;
    let timestamp = parse_timestamp(&raw_time)?;
    let raw_role = wire.role.ok_or(RecordError::MissingField("role"))?;
    let role = Role::parse(&raw_role).ok_or(RecordError::UnknownRole(raw_role))?;
    let text = wire.content.ok_or(RecordError::MissingField("content"))?;

    Ok(MessageEvent {
        timestamp,
        conversation_id,
        event_id: wire.message_id,
        role,
        text,
        team: wire.team,
        user_id: wire.user_id,
    })
}

/// RFC 3339, or a naive ISO-8601 datetime taken as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RecordError> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(RecordError::InvalidTimestamp(raw.to_string()))
}

/// Everything ingestion learned about a partition.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub events: Vec<RawEvent>,
    pub input_files: u64,
    /// Non-blank records seen, valid or not.
    pub events_read: u64,
    pub invalid_count: u64,
    pub errors: Vec<ErrorDescriptor>,
}

impl IngestOutcome {
    fn reject(&mut self, key: &str, line: u64, error: RecordError) {
        tracing::warn!(key, line, error = %error, "Skipping invalid record");
        self.invalid_count += 1;
        self.errors
            .push(ErrorDescriptor::new(Stage::Ingest, error.to_string()).at(key, Some(line)));
    }
}

/// Read and parse every source in the partition for `date` (`YYYY-MM-DD`).
pub async fn ingest_partition(
    storage: &dyn StorageBackend,
    date: &str,
) -> Result<IngestOutcome, PipelineError> {
    let prefix = storage::landing_prefix(date);
    let sources = storage.list(&prefix).await?;
    if sources.is_empty() {
        return Err(PipelineError::NoInputSources { prefix });
    }

    tracing::info!(prefix = %prefix, sources = sources.len(), "Ingesting partition");

    let mut outcome = IngestOutcome {
        input_files: sources.len() as u64,
        ..IngestOutcome::default()
    };

    for source in &sources {
        let key = source.key.as_str();
        let lines = match storage.open_text(key).await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(key, error = %e, "Skipping unreadable source");
                outcome
                    .errors
                    .push(ErrorDescriptor::new(Stage::Ingest, e.to_string()).at(key, None));
                continue;
            }
        };

        let before = outcome.events.len();
        for (index, line) in lines.enumerate() {
            let line_no = index as u64 + 1;
            match line {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => {
                    outcome.events_read += 1;
                    match parse_record(&line) {
                        Ok(event) => outcome.events.push(event),
                        Err(e) => outcome.reject(key, line_no, e),
                    }
                }
                Err(StorageError::InvalidText) => {
                    outcome.events_read += 1;
                    outcome.reject(key, line_no, RecordError::InvalidText);
                }
                Err(e) => {
                    tracing::warn!(key, line = line_no, error = %e, "Source read failed; keeping records read so far");
                    outcome
                        .errors
                        .push(ErrorDescriptor::new(Stage::Ingest, e.to_string()).at(key, Some(line_no)));
                    break;
                }
            }
        }

        tracing::debug!(key, valid = outcome.events.len() - before, "Source ingested");
    }

    tracing::info!(
        events_read = outcome.events_read,
        valid = outcome.events.len(),
        invalid = outcome.invalid_count,
        "Ingestion complete"
    );
    Ok(outcome)
}
