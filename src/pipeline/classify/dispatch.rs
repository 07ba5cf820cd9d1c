//! Bounded concurrent dispatch of per-conversation classification.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::taxonomy::fallback_outcome;
use super::ConversationClassifier;
use crate::pipeline::types::{ClassificationOutcome, ClassifiedConversation, Conversation};

/// Classify every conversation with at most `max_in_flight` calls running.
///
/// A permit is taken before each task is spawned and released when the task
/// ends. Results are collected by awaiting the tasks in submission order, so
/// the returned list matches the input order regardless of completion order.
/// A task that panics yields the fallback classification.
pub async fn classify_all(
    classifier: Arc<dyn ConversationClassifier>,
    conversations: Vec<Conversation>,
    max_in_flight: usize,
) -> Vec<ClassifiedConversation> {
    let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut pending: Vec<(Arc<Conversation>, JoinHandle<ClassificationOutcome>)> =
        Vec::with_capacity(conversations.len());

    for conversation in conversations {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .expect("classification semaphore is never closed");
        let conversation = Arc::new(conversation);
        let task_conversation = Arc::clone(&conversation);
        let classifier = Arc::clone(&classifier);

        let handle = tokio::spawn(async move {
            let _permit = permit;
            classifier.classify(&task_conversation).await
        });
        pending.push((conversation, handle));
    }

    let mut classified = Vec::with_capacity(pending.len());
    for (conversation, handle) in pending {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    conversation_id = %conversation.conversation_id,
                    error = %e,
                    "Classification task failed"
                );
                fallback_outcome(
                    &conversation.conversation_id,
                    format!("classification task failed: {e}"),
                    0,
                )
            }
        };
        // The task has finished, so this is the only reference left.
        let conversation = Arc::try_unwrap(conversation).unwrap_or_else(|shared| (*shared).clone());
        classified.push(ClassifiedConversation {
            conversation,
            outcome,
        });
    }
    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierMode;
    use crate::pipeline::classify::{BypassClassifier, FALLBACK_LABEL};
    use crate::pipeline::types::ClassificationResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn conversations(n: usize) -> Vec<Conversation> {
        (0..n)
            .map(|i| Conversation {
                conversation_id: format!("c{i:02}"),
                team: "Eng".into(),
                turns: Vec::new(),
            })
            .collect()
    }

    /// Records the highest number of concurrent calls it observed.
    #[derive(Default)]
    struct ConcurrencyTracker {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ConversationClassifier for ConcurrencyTracker {
        fn mode(&self) -> ClassifierMode {
            ClassifierMode::Inference
        }

        async fn classify(&self, conversation: &Conversation) -> ClassificationOutcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // Later conversations finish first.
            let id: u64 = conversation.conversation_id[1..].parse().unwrap();
            tokio::time::sleep(Duration::from_millis(20 - id)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            ClassificationOutcome {
                result: ClassificationResult {
                    conversation_id: conversation.conversation_id.clone(),
                    label: "Technical Help".into(),
                    confidence: 0.9,
                    reason: String::new(),
                },
                failure: None,
                attempts: 1,
            }
        }
    }

    struct Panicking;

    #[async_trait]
    impl ConversationClassifier for Panicking {
        fn mode(&self) -> ClassifierMode {
            ClassifierMode::Inference
        }

        async fn classify(&self, conversation: &Conversation) -> ClassificationOutcome {
            if conversation.conversation_id == "c01" {
                panic!("classifier bug");
            }
            BypassClassifier.classify(conversation).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_cap_is_respected() {
        let tracker = Arc::new(ConcurrencyTracker::default());
        let classified = classify_all(tracker.clone(), conversations(12), 3).await;

        assert_eq!(classified.len(), 12);
        assert!(tracker.peak.load(Ordering::SeqCst) <= 3);
        assert!(tracker.peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn results_follow_input_order() {
        let tracker = Arc::new(ConcurrencyTracker::default());
        let classified = classify_all(tracker, conversations(8), 8).await;
        let ids: Vec<&str> = classified
            .iter()
            .map(|c| c.conversation.conversation_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c00", "c01", "c02", "c03", "c04", "c05", "c06", "c07"]);
        assert!(classified
            .iter()
            .all(|c| c.outcome.result.conversation_id == c.conversation.conversation_id));
    }

    #[tokio::test]
    async fn panicking_task_gets_fallback() {
        let classified = classify_all(Arc::new(Panicking), conversations(3), 2).await;
        assert_eq!(classified.len(), 3);
        assert!(classified[1].outcome.is_failure());
        assert_eq!(classified[1].label(), FALLBACK_LABEL);
        assert!(!classified[0].outcome.is_failure());
        assert!(!classified[2].outcome.is_failure());
    }

    #[tokio::test]
    async fn empty_input_is_empty_output() {
        assert!(classify_all(Arc::new(BypassClassifier), Vec::new(), 4)
            .await
            .is_empty());
    }
}
