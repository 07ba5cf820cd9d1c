//! Run configuration.
//!
//! One validated `PipelineConfig` is built at process start (see `cli.rs`)
//! and passed by reference into the pipeline. Nothing here is global or
//! mutable after construction.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "classify-pipeline";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default local storage root (relative to the working directory).
pub const DEFAULT_BASE_PATH: &str = "local_data_IO";

/// Default Ollama-compatible inference endpoint.
pub const DEFAULT_INFERENCE_URL: &str = "http://localhost:11434";

/// Default inference model.
pub const DEFAULT_INFERENCE_MODEL: &str = "llama3.2:3b";

/// Upper bound on configured retries; anything larger is an operator error.
const MAX_CONFIGURED_RETRIES: u32 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("S3_BUCKET is required when STORAGE=s3")]
    MissingBucket,

    #[error("{0} is required when LLM_CLASSIFICATION=true")]
    MissingInferenceSetting(&'static str),

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("INFERENCE_MAX_RETRIES must be at most {max}, got {value}")]
    TooManyRetries { value: u32, max: u32 },
}

/// Supported storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Local,
    S3,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::S3 => "s3",
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// S3-compatible object store location.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores. `None` = AWS regional endpoint.
    pub endpoint: Option<String>,
}

impl ObjectStoreConfig {
    /// Endpoint base URL without trailing slash.
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local { base_path: PathBuf },
    ObjectStore(ObjectStoreConfig),
}

impl StorageConfig {
    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::Local { .. } => StorageType::Local,
            Self::ObjectStore(_) => StorageType::S3,
        }
    }
}

/// Which classification strategy runs for the whole partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    /// No network calls; every conversation gets the sentinel label.
    Bypass,
    /// Remote structured inference with retry and fallback.
    Inference,
}

impl ClassifierMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bypass => "bypass",
            Self::Inference => "inference",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub mode: ClassifierMode,
    pub endpoint: String,
    pub model: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Retries after the first attempt (transient failures only).
    pub max_retries: u32,
    /// First backoff delay; doubles per retry.
    pub retry_backoff: Duration,
    /// Maximum classification calls in flight at once.
    pub max_in_flight: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::Inference,
            endpoint: DEFAULT_INFERENCE_URL.to_string(),
            model: DEFAULT_INFERENCE_MODEL.to_string(),
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            max_in_flight: 4,
        }
    }
}

impl ClassifierConfig {
    /// Bypass configuration (no network, deterministic output).
    pub fn bypass() -> Self {
        Self {
            mode: ClassifierMode::Bypass,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::NotPositive {
                field: "CLASSIFY_CONCURRENCY",
            });
        }
        if self.mode == ClassifierMode::Bypass {
            return Ok(());
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingInferenceSetting("INFERENCE_URL"));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingInferenceSetting("INFERENCE_MODEL"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::NotPositive {
                field: "INFERENCE_CONNECT_TIMEOUT",
            });
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::NotPositive {
                field: "INFERENCE_READ_TIMEOUT",
            });
        }
        if self.max_retries > MAX_CONFIGURED_RETRIES {
            return Err(ConfigError::TooManyRetries {
                value: self.max_retries,
                max: MAX_CONFIGURED_RETRIES,
            });
        }
        Ok(())
    }
}

/// Validated configuration for one pipeline run (one date partition).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub date: NaiveDate,
    pub storage: StorageConfig,
    pub classifier: ClassifierConfig,
    /// Also persist the sanitized events as JSONL.
    pub write_sanitized: bool,
    pub log_level: String,
}

impl PipelineConfig {
    /// Local-storage configuration with bypass classification.
    pub fn local(date: NaiveDate, base_path: impl Into<PathBuf>) -> Self {
        Self {
            date,
            storage: StorageConfig::Local {
                base_path: base_path.into(),
            },
            classifier: ClassifierConfig::bypass(),
            write_sanitized: false,
            log_level: "info".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let StorageConfig::ObjectStore(store) = &self.storage {
            if store.bucket.trim().is_empty() {
                return Err(ConfigError::MissingBucket);
            }
        }
        self.classifier.validate()
    }

    /// Partition date as `YYYY-MM-DD`.
    pub fn date_str(&self) -> String {
        format_date(self.date)
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ConfigError::InvalidDate(raw.to_string()))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    let level = match level.as_str() {
        "warning" => "warn",
        "" => "info",
        other => other,
    };
    format!("{level},hyper=warn,reqwest=warn")
}
