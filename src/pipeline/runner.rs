//! One pipeline run over one date partition:
//! ingest → sanitize → assemble → classify → aggregate → write.

use std::sync::Arc;
use std::time::Instant;

use super::aggregate::aggregate;
use super::assemble::assemble_conversations;
use super::classify::{classify_all, ConversationClassifier};
use super::ingest::ingest_partition;
use super::outputs::{render_sanitized_lines, write_metrics, write_run_report, write_sanitized_events};
use super::report::RunReportBuilder;
use super::sanitize::sanitize_events;
use super::types::{DailyMetrics, ErrorDescriptor, RunReport, Stage};
use super::PipelineError;
use crate::config::PipelineConfig;
use crate::storage::StorageBackend;

/// Documents produced by a successful run.
#[derive(Debug)]
pub struct RunOutcome {
    pub metrics: DailyMetrics,
    pub report: RunReport,
}

/// Run the pipeline for `config.date`.
///
/// Systemic failures (no input, an output that cannot be written) abort the
/// run. The run report is still written on that path when storage allows it,
/// but no metrics document is.
pub async fn run_pipeline(
    config: &PipelineConfig,
    storage: &dyn StorageBackend,
    classifier: Arc<dyn ConversationClassifier>,
) -> Result<RunOutcome, PipelineError> {
    let started = Instant::now();
    let date = config.date_str();
    let mut report = RunReportBuilder::new(&date, storage.storage_type(), classifier.mode());

    tracing::info!(
        date = %date,
        storage = %storage.storage_type(),
        classifier = classifier.mode().as_str(),
        "Pipeline run started"
    );

    // ── Ingest ──────────────────────────────────────────
    let ingested = match ingest_partition(storage, &date).await {
        Ok(ingested) => ingested,
        Err(e) => {
            report.push_error(ErrorDescriptor::new(Stage::Ingest, e.to_string()));
            return Err(abort(storage, report, started, e).await);
        }
    };
    let valid = ingested.events.len() as u64;
    report.record_ingestion(
        ingested.input_files,
        ingested.events_read,
        valid,
        ingested.invalid_count,
        ingested.errors,
    );
    if valid == 0 {
        tracing::warn!(date = %date, "No valid events in partition");
    }

    // ── Sanitize ────────────────────────────────────────
    let (events, redactions) = sanitize_events(ingested.events);
    report.record_redactions(redactions);
    tracing::info!(
        total = redactions.total_redactions,
        emails = redactions.emails,
        phones = redactions.phones,
        urls = redactions.urls,
        "Redaction complete"
    );

    let sanitized_lines = if config.write_sanitized {
        match render_sanitized_lines(&events) {
            Ok(lines) => Some(lines),
            Err(e) => {
                let e = PipelineError::Storage(e);
                report.push_error(ErrorDescriptor::new(Stage::Output, e.to_string()));
                return Err(abort(storage, report, started, e).await);
            }
        }
    } else {
        None
    };

    // ── Assemble ────────────────────────────────────────
    let conversations = assemble_conversations(events);
    report.record_assembly(conversations.len() as u64);
    tracing::info!(conversations = conversations.len(), "Conversations assembled");

    // ── Classify (the only concurrent stage) ────────────
    let classified = classify_all(
        Arc::clone(&classifier),
        conversations,
        config.classifier.max_in_flight,
    )
    .await;
    report.record_classification(&classified);
    tracing::info!(
        classified = classified.len(),
        failures = classified.iter().filter(|c| c.outcome.is_failure()).count(),
        "Classification complete"
    );

    // ── Aggregate ───────────────────────────────────────
    let metrics = aggregate(&classified, &date);

    // ── Write ───────────────────────────────────────────
    if let Some(lines) = sanitized_lines {
        if let Err(e) = write_sanitized_events(storage, &date, &lines).await {
            report.push_error(ErrorDescriptor::new(Stage::Output, e.to_string()));
            return Err(abort(storage, report, started, e).await);
        }
        report.mark_sanitized_written();
    }

    if let Err(e) = write_metrics(storage, &metrics).await {
        report.push_error(ErrorDescriptor::new(Stage::Output, e.to_string()));
        return Err(abort(storage, report, started, e).await);
    }
    report.mark_metrics_written();

    let report = report.finish(started.elapsed());
    write_run_report(storage, &report).await?;

    tracing::info!(
        date = %date,
        duration_seconds = report.duration_seconds,
        conversations = metrics.total_conversations,
        "Pipeline run completed"
    );
    Ok(RunOutcome { metrics, report })
}

/// Finalize the report for a failed run, try to persist it, and hand back
/// the error that stopped the run.
async fn abort(
    storage: &dyn StorageBackend,
    report: RunReportBuilder,
    started: Instant,
    error: PipelineError,
) -> PipelineError {
    tracing::error!(error = %error, "Pipeline run failed");
    let report = report.finish(started.elapsed());
    if let Err(write_error) = write_run_report(storage, &report).await {
        tracing::error!(error = %write_error, "Could not write run report for failed run");
    }
    error
}
