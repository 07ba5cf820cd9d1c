//! Daily metrics per (team, task category).

use std::collections::BTreeMap;

use super::types::{CategoryMetric, ClassifiedConversation, DailyMetrics, Role};

#[derive(Default)]
struct Totals {
    conversations: u64,
    turns: u64,
    chars_user: u64,
    chars_assistant: u64,
}

/// Aggregate classified conversations into the metrics document for `date`.
/// Rows come out sorted by team, then category; the input order is irrelevant.
pub fn aggregate(classified: &[ClassifiedConversation], date: &str) -> DailyMetrics {
    let mut groups: BTreeMap<(&str, &str), Totals> = BTreeMap::new();

    for item in classified {
        let conversation = &item.conversation;
        let totals = groups
            .entry((conversation.team.as_str(), item.label()))
            .or_default();
        totals.conversations += 1;
        totals.turns += conversation.turn_count() as u64;
        totals.chars_user += conversation.chars_for(Role::User) as u64;
        totals.chars_assistant += conversation.chars_for(Role::Assistant) as u64;
    }

    let metrics: Vec<CategoryMetric> = groups
        .into_iter()
        .map(|((team, category), totals)| {
            // Every group has at least one member.
            let n = totals.conversations as f64;
            CategoryMetric {
                team: team.to_string(),
                task_category: category.to_string(),
                conversation_count: totals.conversations,
                total_turns: totals.turns,
                avg_turns: totals.turns as f64 / n,
                avg_chars_user: totals.chars_user as f64 / n,
                total_chars_user: totals.chars_user,
                total_chars_assistant: totals.chars_assistant,
                avg_chars_assistant: totals.chars_assistant as f64 / n,
            }
        })
        .collect();

    DailyMetrics {
        date: date.to_string(),
        total_conversations: classified.len() as u64,
        total_events_processed: classified
            .iter()
            .map(|c| c.conversation.turn_count() as u64)
            .sum(),
        metrics,
    }
}
