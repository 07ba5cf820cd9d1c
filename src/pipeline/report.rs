//! Run report accumulation.
//!
//! The builder collects counters as each stage finishes and is consumed by
//! `finish`, so a report is produced exactly once per run.

use std::time::Duration;

use super::types::{ClassifiedConversation, ErrorDescriptor, RedactionStats, RunReport, Stage};
use crate::config::{ClassifierMode, StorageType};

pub struct RunReportBuilder {
    report: RunReport,
}

impl RunReportBuilder {
    pub fn new(date: &str, storage_type: StorageType, classifier_mode: ClassifierMode) -> Self {
        Self {
            report: RunReport {
                date: date.to_string(),
                storage_type,
                classifier_mode,
                input_files_count: 0,
                events_read: 0,
                events_valid: 0,
                invalid_events: 0,
                conversations_assembled: 0,
                conversations_classified: 0,
                classification_failures: 0,
                redaction_stats: RedactionStats::default(),
                metrics_written: false,
                sanitized_written: false,
                duration_seconds: 0.0,
                errors: Vec::new(),
            },
        }
    }

    pub fn record_ingestion(
        &mut self,
        input_files: u64,
        events_read: u64,
        events_valid: u64,
        invalid_events: u64,
        errors: Vec<ErrorDescriptor>,
    ) {
        self.report.input_files_count = input_files;
        self.report.events_read = events_read;
        self.report.events_valid = events_valid;
        self.report.invalid_events = invalid_events;
        self.report.errors.extend(errors);
    }

    pub fn record_redactions(&mut self, stats: RedactionStats) {
        self.report.redaction_stats.add(stats);
    }

    pub fn record_assembly(&mut self, conversations: u64) {
        self.report.conversations_assembled = conversations;
    }

    /// Count outcomes and log one descriptor per fallback.
    pub fn record_classification(&mut self, classified: &[ClassifiedConversation]) {
        self.report.conversations_classified = classified.len() as u64;
        for item in classified {
            if let Some(failure) = &item.outcome.failure {
                self.report.classification_failures += 1;
                self.report.errors.push(
                    ErrorDescriptor::new(Stage::Classify, failure.clone())
                        .for_conversation(&item.conversation.conversation_id),
                );
            }
        }
    }

    pub fn mark_metrics_written(&mut self) {
        self.report.metrics_written = true;
    }

    pub fn mark_sanitized_written(&mut self) {
        self.report.sanitized_written = true;
    }

    pub fn push_error(&mut self, error: ErrorDescriptor) {
        self.report.errors.push(error);
    }

    pub fn finish(mut self, elapsed: Duration) -> RunReport {
        self.report.duration_seconds = elapsed.as_secs_f64();
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::taxonomy::fallback_outcome;
    use crate::pipeline::types::Conversation;

    fn classified(id: &str, failed: bool) -> ClassifiedConversation {
        let outcome = if failed {
            fallback_outcome(id, "Inference request timed out", 3)
        } else {
            let mut ok = fallback_outcome(id, "", 1);
            ok.failure = None;
            ok
        };
        ClassifiedConversation {
            conversation: Conversation {
                conversation_id: id.into(),
                team: "Eng".into(),
                turns: Vec::new(),
            },
            outcome,
        }
    }

    #[test]
    fn fresh_report_is_clean() {
        let report = RunReportBuilder::new("2026-01-03", StorageType::Local, ClassifierMode::Bypass)
            .finish(Duration::from_millis(1500));
        assert_eq!(report.date, "2026-01-03");
        assert_eq!(report.duration_seconds, 1.5);
        assert!(report.errors.is_empty());
        assert!(!report.metrics_written);
    }

    #[test]
    fn classification_failures_are_counted_and_described() {
        let mut builder =
            RunReportBuilder::new("2026-01-03", StorageType::Local, ClassifierMode::Inference);
        builder.record_classification(&[
            classified("c1", false),
            classified("c2", true),
            classified("c3", true),
        ]);
        let report = builder.finish(Duration::ZERO);

        assert_eq!(report.conversations_classified, 3);
        assert_eq!(report.classification_failures, 2);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].stage, Stage::Classify);
        assert_eq!(report.errors[0].conversation_id.as_deref(), Some("c2"));
    }

    #[test]
    fn errors_keep_pipeline_order() {
        let mut builder = RunReportBuilder::new("2026-01-03", StorageType::S3, ClassifierMode::Bypass);
        builder.record_ingestion(
            2,
            5,
            4,
            1,
            vec![ErrorDescriptor::new(Stage::Ingest, "bad line").at("landing/a", Some(2))],
        );
        builder.record_redactions(RedactionStats::new(1, 0, 0));
        builder.record_redactions(RedactionStats::new(0, 2, 0));
        builder.push_error(ErrorDescriptor::new(Stage::Output, "write failed"));
        let report = builder.finish(Duration::ZERO);

        assert_eq!(report.events_read, 5);
        assert_eq!(report.events_valid, 4);
        assert_eq!(report.invalid_events, 1);
        assert_eq!(report.redaction_stats.total_redactions, 3);
        let stages: Vec<Stage> = report.errors.iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![Stage::Ingest, Stage::Output]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["events_invalid"], 1);
        assert_eq!(json["storage_type"], "s3");
        assert_eq!(json["classifier_mode"], "bypass");
    }
}
