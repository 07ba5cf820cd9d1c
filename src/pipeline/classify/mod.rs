//! Task-category classification.
//!
//! Two interchangeable strategies behind `ConversationClassifier`, chosen
//! once per run by `build_classifier`:
//! - `BypassClassifier`: sentinel label, no network.
//! - `InferenceClassifier`: structured inference with bounded retry and a
//!   fallback classification when attempts run out.
//!
//! `dispatch::classify_all` fans conversations out under an in-flight cap.

pub mod bypass;
pub mod dispatch;
pub mod ollama;
pub mod retry;
pub mod taxonomy;

pub use bypass::BypassClassifier;
pub use dispatch::classify_all;
pub use ollama::OllamaInferenceClient;
pub use retry::InferenceClassifier;
pub use taxonomy::{build_snippet, FALLBACK_LABEL, TAXONOMY};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use super::types::{ClassificationOutcome, Conversation};
use crate::config::{ClassifierConfig, ClassifierMode};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Inference request timed out")]
    Timeout,

    #[error("Inference endpoint unreachable: {0}")]
    Connection(String),

    #[error("Inference endpoint throttled the request")]
    Throttled { retry_after: Option<Duration> },

    #[error("Inference endpoint failed (status {status}): {body}")]
    Server { status: u16, body: String },

    #[error("Inference request rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed inference response: {0}")]
    MalformedResponse(String),

    #[error("Label '{0}' is not in the taxonomy")]
    UnknownLabel(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl InferenceError {
    /// Transient failures are worth another attempt; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(_) | Self::Throttled { .. } | Self::Server { .. }
        )
    }

    /// Server-requested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Structured object returned by the inference backend, before validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelPrediction {
    pub label: String,
    pub confidence: f64,
    pub reason: String,
}

/// The external structured-inference capability.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn classify(&self, text: &str, taxonomy: &[&str]) -> Result<LabelPrediction, InferenceError>;
}

/// Per-conversation classification strategy. Never fails: problems are
/// reported through `ClassificationOutcome::failure`.
#[async_trait]
pub trait ConversationClassifier: Send + Sync {
    fn mode(&self) -> ClassifierMode;

    async fn classify(&self, conversation: &Conversation) -> ClassificationOutcome;
}

/// Select the strategy for this run.
pub fn build_classifier(
    config: &ClassifierConfig,
) -> Result<Arc<dyn ConversationClassifier>, InferenceError> {
    match config.mode {
        ClassifierMode::Bypass => {
            tracing::info!("Classification bypassed; all conversations get the sentinel label");
            Ok(Arc::new(BypassClassifier))
        }
        ClassifierMode::Inference => {
            let client = OllamaInferenceClient::new(
                &config.endpoint,
                &config.model,
                config.connect_timeout,
                config.read_timeout,
            )?;
            tracing::info!(
                endpoint = %config.endpoint,
                model = %config.model,
                max_retries = config.max_retries,
                max_in_flight = config.max_in_flight,
                "Inference classification enabled"
            );
            Ok(Arc::new(InferenceClassifier::new(
                Arc::new(client),
                config.max_retries,
                config.retry_backoff,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_enumerated() {
        assert!(InferenceError::Timeout.is_transient());
        assert!(InferenceError::Connection("refused".into()).is_transient());
        assert!(InferenceError::Throttled { retry_after: None }.is_transient());
        assert!(InferenceError::Server { status: 503, body: String::new() }.is_transient());

        assert!(!InferenceError::Rejected { status: 400, body: String::new() }.is_transient());
        assert!(!InferenceError::MalformedResponse("x".into()).is_transient());
        assert!(!InferenceError::UnknownLabel("Poetry".into()).is_transient());
        assert!(!InferenceError::HttpClient("x".into()).is_transient());
    }

    #[test]
    fn retry_after_only_from_throttling() {
        let wait = Duration::from_secs(3);
        assert_eq!(
            InferenceError::Throttled { retry_after: Some(wait) }.retry_after(),
            Some(wait)
        );
        assert_eq!(InferenceError::Timeout.retry_after(), None);
    }

    #[test]
    fn builds_strategy_from_mode() {
        let bypass = build_classifier(&ClassifierConfig::bypass()).unwrap();
        assert_eq!(bypass.mode(), ClassifierMode::Bypass);

        let inference = build_classifier(&ClassifierConfig::default()).unwrap();
        assert_eq!(inference.mode(), ClassifierMode::Inference);
    }
}
