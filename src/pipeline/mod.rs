pub mod aggregate;
pub mod assemble;
pub mod classify;
pub mod ingest;
pub mod outputs;
pub mod report;
pub mod runner;
pub mod sanitize;
pub mod types;


pub use runner::{run_pipeline, RunOutcome};
pub use types::*;

use thiserror::Error;

use crate::config::ConfigError;
use crate::storage::StorageError;
use classify::InferenceError;

/// Errors that stop a run. Everything per-record or per-conversation is
/// recorded in the run report instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No input files found at {prefix}")]
    NoInputSources { prefix: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to write {key}: {source}")]
    Output {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Classifier setup failed: {0}")]
    Classifier(#[from] InferenceError),
}
