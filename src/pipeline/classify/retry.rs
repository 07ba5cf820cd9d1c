//! Inference-backed classifier: bounded retry for transient failures,
//! validation of the structured reply, fallback when attempts run out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::taxonomy::{
    build_snippet, fallback_outcome, is_known_label, truncate_with_ellipsis, REASON_MAX_CHARS,
    TAXONOMY,
};
use super::{ConversationClassifier, InferenceClient, InferenceError, LabelPrediction};
use crate::config::ClassifierMode;
use crate::pipeline::types::{ClassificationOutcome, ClassificationResult, Conversation};

/// Longest wait between two attempts, whatever the server asks for.
pub const MAX_BACKOFF: Duration = Duration::from_secs(8);

pub struct InferenceClassifier {
    client: Arc<dyn InferenceClient>,
    max_retries: u32,
    base_backoff: Duration,
}

impl InferenceClassifier {
    pub fn new(client: Arc<dyn InferenceClient>, max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            client,
            max_retries,
            base_backoff,
        }
    }
}

/// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
/// A server-provided `Retry-After` replaces the computed value.
pub fn backoff_delay(base: Duration, retry: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(wait) = retry_after {
        return wait.min(MAX_BACKOFF);
    }
    let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(MAX_BACKOFF).min(MAX_BACKOFF)
}

/// Turn a raw prediction into a result, rejecting anything outside the contract.
fn validate(conversation_id: &str, prediction: LabelPrediction) -> Result<ClassificationResult, InferenceError> {
    if !is_known_label(&prediction.label) {
        return Err(InferenceError::UnknownLabel(prediction.label));
    }
    if !prediction.confidence.is_finite() {
        return Err(InferenceError::MalformedResponse(format!(
            "confidence is not a number: {}",
            prediction.confidence
        )));
    }
    Ok(ClassificationResult {
        conversation_id: conversation_id.to_string(),
        label: prediction.label,
        confidence: prediction.confidence.clamp(0.0, 1.0),
        reason: truncate_with_ellipsis(prediction.reason.trim(), REASON_MAX_CHARS),
    })
}

#[async_trait]
impl ConversationClassifier for InferenceClassifier {
    fn mode(&self) -> ClassifierMode {
        ClassifierMode::Inference
    }

    async fn classify(&self, conversation: &Conversation) -> ClassificationOutcome {
        let conversation_id = conversation.conversation_id.as_str();
        let snippet = build_snippet(conversation);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let error = match self
                .client
                .classify(&snippet, TAXONOMY)
                .await
                .and_then(|prediction| validate(conversation_id, prediction))
            {
                Ok(result) => {
                    tracing::debug!(
                        conversation_id,
                        label = %result.label,
                        confidence = result.confidence,
                        attempts,
                        "Conversation classified"
                    );
                    return ClassificationOutcome {
                        result,
                        failure: None,
                        attempts,
                    };
                }
                Err(e) => e,
            };

            let retries_used = attempts - 1;
            if !error.is_transient() || retries_used >= self.max_retries {
                tracing::warn!(
                    conversation_id,
                    attempts,
                    error = %error,
                    "Classification failed, using fallback label"
                );
                return fallback_outcome(conversation_id, error.to_string(), attempts);
            }

            let delay = backoff_delay(self.base_backoff, retries_used, error.retry_after());
            tracing::warn!(
                conversation_id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Classification call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
