//! Storage capability used at the two pipeline boundaries: one bulk read of
//! the landing partition, one bulk set of writes at the end.
//!
//! Keys are S3-style (`landing/date=2026-01-03/input01.jsonl`). The pipeline
//! depends only on `StorageBackend`; the concrete backend is picked once in
//! `build_storage`.

pub mod local;
pub mod object_store;
pub mod sigv4;

use std::io::BufRead;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{StorageConfig, StorageType};

pub use local::LocalStorage;
pub use object_store::ObjectStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("Line is not valid UTF-8")]
    InvalidText,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Object store request failed: {0}")]
    Request(String),

    #[error("Object store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed object store response: {0}")]
    MalformedResponse(String),

    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(&'static str),
}

/// Reference to a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<String>,
}

/// Lazily produced text lines of one object.
pub type TextLines = Box<dyn Iterator<Item = Result<String, StorageError>> + Send>;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which backend this is (recorded in the run report).
    fn storage_type(&self) -> StorageType;

    /// All objects under `prefix`, sorted by key.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectRef>, StorageError>;

    /// Stream the object's lines. Line terminators are stripped.
    async fn open_text(&self, key: &str) -> Result<TextLines, StorageError>;

    /// Write `data` as pretty-printed JSON, replacing any existing object.
    async fn write_json(&self, key: &str, data: &serde_json::Value) -> Result<(), StorageError>;

    /// Write one line per entry, each terminated by `\n`.
    async fn write_text_lines(&self, key: &str, lines: &[String]) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// Build the configured backend.
pub fn build_storage(config: &StorageConfig) -> Result<Box<dyn StorageBackend>, StorageError> {
    match config {
        StorageConfig::Local { base_path } => {
            let storage = LocalStorage::new(base_path)?;
            tracing::info!(base_path = %storage.base_path().display(), "Local storage initialized");
            Ok(Box::new(storage))
        }
        StorageConfig::ObjectStore(store) => {
            let storage = ObjectStorage::from_env(store)?;
            tracing::info!(
                bucket = %store.bucket,
                region = %store.region,
                endpoint = %store.endpoint_url(),
                "Object storage initialized"
            );
            Ok(Box::new(storage))
        }
    }
}

// ═══════════════════════════════════════════
// Key layout
// ═══════════════════════════════════════════

pub fn landing_prefix(date: &str) -> String {
    format!("landing/date={date}/")
}

pub fn metrics_key(date: &str) -> String {
    format!("curated/metrics_daily/date={date}/metrics.json")
}

pub fn report_key(date: &str) -> String {
    format!("reports/date={date}/run_latest.json")
}

pub fn sanitized_key(date: &str) -> String {
    format!("sanitized/date={date}/messages.jsonl")
}

/// Serialize lines into a single `\n`-terminated body.
pub(crate) fn join_lines(lines: &[String]) -> String {
    let mut body = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        body.push_str(line.trim_end_matches('\n'));
        body.push('\n');
    }
    body
}

// ═══════════════════════════════════════════
// Line reader
// ═══════════════════════════════════════════

/// Splits a reader into lines, decoding each one separately so a single
/// bad line does not end the stream.
pub(crate) struct LineReader<R> {
    reader: R,
    done: bool,
}

impl<R: BufRead> LineReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = Result<String, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                Some(String::from_utf8(buf).map_err(|_| StorageError::InvalidText))
            }
            Err(e) => {
                self.done = true;
                Some(Err(StorageError::Io(e)))
            }
        }
    }
}
