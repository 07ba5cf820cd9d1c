//! Conversation reconstruction from a flat, unordered event stream.

use std::collections::HashMap;

use super::types::{Conversation, SanitizedEvent, UNKNOWN_TEAM};

/// Group sanitized events into conversations.
///
/// Turns are ordered by timestamp; events with equal timestamps keep their
/// ingestion order. The team comes from the earliest turn. Conversations are
/// returned sorted by id.
pub fn assemble_conversations(events: Vec<SanitizedEvent>) -> Vec<Conversation> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<SanitizedEvent>> = Vec::new();

    for event in events {
        match index.get(&event.conversation_id) {
            Some(&slot) => groups[slot].push(event),
            None => {
                index.insert(event.conversation_id.clone(), groups.len());
                groups.push(vec![event]);
            }
        }
    }

    let mut conversations: Vec<Conversation> = groups
        .into_iter()
        .filter_map(|mut turns| {
            // Vec::sort_by_key is stable.
            turns.sort_by_key(|t| t.timestamp);
            let first = turns.first()?;
            let team = first
                .team
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(UNKNOWN_TEAM)
                .to_string();
            Some(Conversation {
                conversation_id: first.conversation_id.clone(),
                team,
                turns,
            })
        })
        .collect();

    conversations.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));

    tracing::debug!(conversations = conversations.len(), "Conversations assembled");
    conversations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sanitize::sanitize_text;
    use crate::pipeline::types::{MessageEvent, Role};
    use chrono::{TimeZone, Utc};

    fn event(conv: &str, minute: u32, id: &str, team: Option<&str>) -> SanitizedEvent {
        MessageEvent {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 3, 10, minute, 0).unwrap(),
            conversation_id: conv.into(),
            event_id: Some(id.into()),
            role: Role::User,
            text: sanitize_text(&format!("text {id}")).0,
            team: team.map(String::from),
            user_id: None,
        }
    }

    fn ids(conv: &Conversation) -> Vec<&str> {
        conv.turns
            .iter()
            .map(|t| t.event_id.as_deref().unwrap())
            .collect()
    }

    #[test]
    fn groups_and_orders_turns() {
        let conversations = assemble_conversations(vec![
            event("c2", 5, "c2-b", Some("Sales")),
            event("c1", 3, "c1-b", Some("Eng")),
            event("c1", 1, "c1-a", Some("Eng")),
            event("c2", 2, "c2-a", Some("Sales")),
            event("c1", 9, "c1-c", Some("Eng")),
        ]);

        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].conversation_id, "c1");
        assert_eq!(ids(&conversations[0]), vec!["c1-a", "c1-b", "c1-c"]);
        assert_eq!(ids(&conversations[1]), vec!["c2-a", "c2-b"]);

        for conv in &conversations {
            assert!(conv
                .turns
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }

    #[test]
    fn equal_timestamps_keep_ingestion_order() {
        let conversations = assemble_conversations(vec![
            event("c1", 4, "second-arrival-late", None),
            event("c1", 1, "first", None),
            event("c1", 4, "third-arrival-late", None),
        ]);
        assert_eq!(
            ids(&conversations[0]),
            vec!["first", "second-arrival-late", "third-arrival-late"]
        );
    }

    #[test]
    fn earliest_turn_decides_team() {
        let conversations = assemble_conversations(vec![
            event("c1", 7, "late", Some("Marketing")),
            event("c1", 1, "early", Some("Support")),
        ]);
        assert_eq!(conversations[0].team, "Support");
    }

    #[test]
    fn blank_team_is_unknown() {
        let conversations = assemble_conversations(vec![
            event("c1", 1, "a", Some("  ")),
            event("c2", 1, "b", None),
        ]);
        assert!(conversations.iter().all(|c| c.team == UNKNOWN_TEAM));
    }

    #[test]
    fn no_events_no_conversations() {
        assert!(assemble_conversations(Vec::new()).is_empty());
    }
}
