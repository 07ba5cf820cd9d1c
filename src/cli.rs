//! Command-line and environment configuration.
//!
//! Every option has a flag and an environment variable; flags win. The
//! parsed arguments are turned into one validated `PipelineConfig`.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};

use crate::config::{
    parse_date, ClassifierConfig, ClassifierMode, ConfigError, ObjectStoreConfig, PipelineConfig,
    StorageConfig, DEFAULT_BASE_PATH, DEFAULT_INFERENCE_MODEL, DEFAULT_INFERENCE_URL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageArg {
    Local,
    S3,
}

#[derive(Debug, Parser)]
#[command(
    name = "classify-pipeline",
    version,
    about = "Turn one day of raw conversation logs into privacy-safe usage metrics",
    long_about = "Reads landing/date=YYYY-MM-DD/, redacts PII, rebuilds conversations, classifies each one by task category and writes per-team metrics plus a run report.",
    after_help = "Every option can also be set through the environment variable shown next to it."
)]
pub struct Cli {
    #[arg(long, env = "STORAGE", value_enum, default_value = "local", help = "Storage backend")]
    pub storage: StorageArg,

    #[arg(
        long,
        env = "DATE",
        value_name = "YYYY-MM-DD",
        help = "Partition date to process (defaults to today, UTC)"
    )]
    pub date: Option<String>,

    #[arg(
        long = "base-path",
        env = "BASE_PATH",
        value_name = "PATH",
        default_value = DEFAULT_BASE_PATH,
        help = "Root directory for local storage"
    )]
    pub base_path: PathBuf,

    #[arg(long = "s3-bucket", env = "S3_BUCKET", help = "Bucket name (required with --storage s3)")]
    pub s3_bucket: Option<String>,

    #[arg(long = "aws-region", env = "AWS_REGION", default_value = "us-east-1")]
    pub aws_region: String,

    #[arg(
        long = "s3-endpoint",
        env = "S3_ENDPOINT",
        value_name = "URL",
        help = "Custom endpoint for S3-compatible stores"
    )]
    pub s3_endpoint: Option<String>,

    #[arg(
        long = "write-sanitized",
        env = "WRITE_SANITIZED",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value_t = false,
        help = "Also write the sanitized events as JSONL"
    )]
    pub write_sanitized: bool,

    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = "INFO")]
    pub log_level: String,

    #[arg(
        long = "llm-classification",
        env = "LLM_CLASSIFICATION",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        default_value_t = true,
        help = "Classify with the inference endpoint; false labels everything as Unclassified"
    )]
    pub llm_classification: bool,

    #[arg(long = "inference-url", env = "INFERENCE_URL", default_value = DEFAULT_INFERENCE_URL)]
    pub inference_url: String,

    #[arg(long = "inference-model", env = "INFERENCE_MODEL", default_value = DEFAULT_INFERENCE_MODEL)]
    pub inference_model: String,

    #[arg(
        long = "inference-connect-timeout",
        env = "INFERENCE_CONNECT_TIMEOUT",
        value_name = "SECONDS",
        default_value_t = 2.0
    )]
    pub inference_connect_timeout: f64,

    #[arg(
        long = "inference-read-timeout",
        env = "INFERENCE_READ_TIMEOUT",
        value_name = "SECONDS",
        default_value_t = 5.0
    )]
    pub inference_read_timeout: f64,

    #[arg(long = "inference-max-retries", env = "INFERENCE_MAX_RETRIES", default_value_t = 2)]
    pub inference_max_retries: u32,

    #[arg(
        long = "inference-backoff-ms",
        env = "INFERENCE_BACKOFF_MS",
        value_name = "MILLIS",
        default_value_t = 500,
        help = "First retry delay; doubles per retry, capped at 8s"
    )]
    pub inference_backoff_ms: u64,

    #[arg(
        long = "classify-concurrency",
        env = "CLASSIFY_CONCURRENCY",
        default_value_t = 4,
        help = "Maximum classification calls in flight"
    )]
    pub classify_concurrency: usize,
}

/// Seconds → Duration; negative or non-finite values become zero and are
/// rejected by validation.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

impl Cli {
    /// Build and validate the run configuration.
    pub fn into_config(self) -> Result<PipelineConfig, ConfigError> {
        let date = match self.date.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => parse_date(raw)?,
            _ => chrono::Utc::now().date_naive(),
        };

        let storage = match self.storage {
            StorageArg::Local => StorageConfig::Local {
                base_path: self.base_path,
            },
            StorageArg::S3 => StorageConfig::ObjectStore(ObjectStoreConfig {
                bucket: self.s3_bucket.unwrap_or_default(),
                region: self.aws_region,
                endpoint: self.s3_endpoint.filter(|e| !e.trim().is_empty()),
            }),
        };

        let classifier = ClassifierConfig {
            mode: if self.llm_classification {
                ClassifierMode::Inference
            } else {
                ClassifierMode::Bypass
            },
            endpoint: self.inference_url,
            model: self.inference_model,
            connect_timeout: seconds(self.inference_connect_timeout),
            read_timeout: seconds(self.inference_read_timeout),
            max_retries: self.inference_max_retries,
            retry_backoff: Duration::from_millis(self.inference_backoff_ms),
            max_in_flight: self.classify_concurrency,
        };

        let config = PipelineConfig {
            date,
            storage,
            classifier,
            write_sanitized: self.write_sanitized,
            log_level: self.log_level,
        };
        config.validate()?;
        Ok(config)
    }
}
