//! Label set, snippet rendering and the fallback classification.

use crate::pipeline::types::{ClassificationOutcome, ClassificationResult, Conversation};

/// Closed set of task categories the classifier may emit.
pub const TAXONOMY: &[&str] = &[
    "Summarization",
    "Drafting/Rewriting",
    "Research/Synthesis",
    "Ideation/Planning",
    "Data/Analysis (general)",
    "Translation/Tone",
    "Internal Q&A (policy/process)",
    "Customer Comms (support/sales)",
    "Technical Help",
    "Other/Unknown",
];

/// Sentinel label for bypass and for failed inference. Not in `TAXONOMY`.
pub const FALLBACK_LABEL: &str = "Unclassified";

pub const BYPASS_REASON: &str = "LLM classification disabled";

const SNIPPET_MAX_TURNS: usize = 8;
const SNIPPET_TURN_CHARS: usize = 200;
const SNIPPET_MAX_CHARS: usize = 2_000;
pub(crate) const REASON_MAX_CHARS: usize = 100;
const ELLIPSIS: &str = "...";

pub fn is_known_label(label: &str) -> bool {
    TAXONOMY.contains(&label)
}

/// First `max` characters of `text`.
pub(crate) fn take_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Cut `text` to at most `max` characters, marking the cut with `...`.
pub(crate) fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    format!("{}{ELLIPSIS}", take_chars(text, keep))
}

/// Compact text rendering of a conversation for the classifier.
///
/// At most eight turns as `role: text`, each turn cut at 200 characters,
/// plus a `... (N more messages)` line when turns were left out.
pub fn build_snippet(conversation: &Conversation) -> String {
    let mut lines: Vec<String> = conversation
        .turns
        .iter()
        .take(SNIPPET_MAX_TURNS)
        .map(|turn| {
            let text = turn.text.as_str();
            let mut content = take_chars(text, SNIPPET_TURN_CHARS).to_string();
            if content.len() < text.len() {
                content.push_str(ELLIPSIS);
            }
            format!("{}: {content}", turn.role)
        })
        .collect();

    let remaining = conversation.turns.len().saturating_sub(SNIPPET_MAX_TURNS);
    if remaining > 0 {
        lines.push(format!("... ({remaining} more messages)"));
    }

    truncate_with_ellipsis(&lines.join("\n"), SNIPPET_MAX_CHARS)
}

/// Classification used when inference could not produce a valid result.
pub fn fallback_outcome(
    conversation_id: &str,
    failure: impl Into<String>,
    attempts: u32,
) -> ClassificationOutcome {
    let failure = failure.into();
    ClassificationOutcome {
        result: ClassificationResult {
            conversation_id: conversation_id.to_string(),
            label: FALLBACK_LABEL.to_string(),
            confidence: 0.0,
            reason: truncate_with_ellipsis(&format!("fallback: {failure}"), REASON_MAX_CHARS),
        },
        failure: Some(failure),
        attempts,
    }
}
