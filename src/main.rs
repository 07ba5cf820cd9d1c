use std::process::ExitCode;

use clap::Parser;

use classify_pipeline::cli::Cli;
use classify_pipeline::config::APP_NAME;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{APP_NAME}: {e}");
            return ExitCode::FAILURE;
        }
    };

    classify_pipeline::init_tracing(&config.log_level);

    match classify_pipeline::run(&config).await {
        Ok(outcome) => {
            tracing::info!(
                conversations = outcome.metrics.total_conversations,
                failures = outcome.report.classification_failures,
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Pipeline failed");
            ExitCode::FAILURE
        }
    }
}
