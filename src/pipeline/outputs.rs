//! Persisted documents: metrics, run report, optional sanitized dump.

use super::types::{DailyMetrics, RunReport, SanitizedEvent};
use super::PipelineError;
use crate::storage::{self, StorageBackend, StorageError};

fn output_error(key: String) -> impl FnOnce(StorageError) -> PipelineError {
    move |source| PipelineError::Output { key, source }
}

pub async fn write_metrics(
    storage: &dyn StorageBackend,
    metrics: &DailyMetrics,
) -> Result<String, PipelineError> {
    let key = storage::metrics_key(&metrics.date);
    let value = serde_json::to_value(metrics)
        .map_err(StorageError::from)
        .map_err(output_error(key.clone()))?;
    storage
        .write_json(&key, &value)
        .await
        .map_err(output_error(key.clone()))?;
    tracing::info!(key = %key, groups = metrics.metrics.len(), "Metrics written");
    Ok(key)
}

pub async fn write_run_report(
    storage: &dyn StorageBackend,
    report: &RunReport,
) -> Result<String, PipelineError> {
    let key = storage::report_key(&report.date);
    let value = serde_json::to_value(report)
        .map_err(StorageError::from)
        .map_err(output_error(key.clone()))?;
    storage
        .write_json(&key, &value)
        .await
        .map_err(output_error(key.clone()))?;
    tracing::info!(key = %key, "Run report written");
    Ok(key)
}

/// One JSON object per sanitized event, in ingestion order.
pub fn render_sanitized_lines(events: &[SanitizedEvent]) -> Result<Vec<String>, StorageError> {
    events
        .iter()
        .map(|event| serde_json::to_string(event).map_err(StorageError::from))
        .collect()
}

pub async fn write_sanitized_events(
    storage: &dyn StorageBackend,
    date: &str,
    lines: &[String],
) -> Result<String, PipelineError> {
    let key = storage::sanitized_key(date);
    storage
        .write_text_lines(&key, lines)
        .await
        .map_err(output_error(key.clone()))?;
    tracing::info!(key = %key, events = lines.len(), "Sanitized events written");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sanitize::sanitize_event;
    use crate::pipeline::types::{MessageEvent, Role};
    use crate::storage::LocalStorage;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn metrics_land_under_curated_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        let metrics = DailyMetrics {
            date: "2026-01-03".into(),
            total_conversations: 0,
            total_events_processed: 0,
            metrics: Vec::new(),
        };

        let key = write_metrics(&storage, &metrics).await.unwrap();
        assert_eq!(key, "curated/metrics_daily/date=2026-01-03/metrics.json");
        let raw = std::fs::read_to_string(dir.path().join(&key)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["date"], "2026-01-03");
        assert_eq!(json["metrics"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn sanitized_dump_is_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        let (event, _) = sanitize_event(MessageEvent {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 3, 10, 0, 0).unwrap(),
            conversation_id: "c1".into(),
            event_id: Some("m1".into()),
            role: Role::User,
            text: "reach me at a@b.com".into(),
            team: Some("Sales".into()),
            user_id: Some("u1".into()),
        });

        let lines = render_sanitized_lines(&[event.clone(), event]).unwrap();
        let key = write_sanitized_events(&storage, "2026-01-03", &lines).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join(&key)).unwrap();
        let parsed: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["content"], "reach me at [EMAIL_REDACTED]");
        assert_eq!(parsed[0]["user_id"], "u1");
        assert!(!raw.contains("a@b.com"));
    }
}
