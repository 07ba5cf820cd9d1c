pub mod cli;
pub mod config;
pub mod pipeline;
pub mod storage;

use tracing_subscriber::EnvFilter;

use config::PipelineConfig;
use pipeline::{PipelineError, RunOutcome};

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter(log_level))),
        )
        .try_init();
}

/// Build the configured storage backend and classifier, then process the
/// partition for `config.date`.
pub async fn run(config: &PipelineConfig) -> Result<RunOutcome, PipelineError> {
    tracing::info!(
        "{} v{} processing {}",
        config::APP_NAME,
        config::APP_VERSION,
        config.date_str()
    );

    let storage = storage::build_storage(&config.storage)?;
    let classifier = pipeline::classify::build_classifier(&config.classifier)?;
    pipeline::run_pipeline(config, storage.as_ref(), classifier).await
}
