use async_trait::async_trait;

use super::taxonomy::{BYPASS_REASON, FALLBACK_LABEL};
use super::ConversationClassifier;
use crate::config::ClassifierMode;
use crate::pipeline::types::{ClassificationOutcome, ClassificationResult, Conversation};

/// Labels every conversation with the sentinel, without any network call.
/// Output depends only on the conversation id, so bypass runs are reproducible.
pub struct BypassClassifier;

#[async_trait]
impl ConversationClassifier for BypassClassifier {
    fn mode(&self) -> ClassifierMode {
        ClassifierMode::Bypass
    }

    async fn classify(&self, conversation: &Conversation) -> ClassificationOutcome {
        ClassificationOutcome {
            result: ClassificationResult {
                conversation_id: conversation.conversation_id.clone(),
                label: FALLBACK_LABEL.to_string(),
                confidence: 1.0,
                reason: BYPASS_REASON.to_string(),
            },
            failure: None,
            attempts: 0,
        }
    }
}
