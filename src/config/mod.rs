//! Configuration loading.
//!
//! Configuration is a YAML file with environment interpolation applied
//! before parsing. Every tunable has a serde default so a minimal file only
//! names the source:
//!
//! ```yaml
//! source:
//!   url: "s3://${BUCKET}/firestore-export"
//! ```

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{
    ConfigError, EmptySourceUrlSnafu, EnvInterpolationSnafu, InvalidConcurrencySnafu,
    InvalidMaxReceiveCountSnafu, InvalidPageSizeSnafu, InvalidSampleSizeSnafu, ReadFileSnafu,
    YamlParseSnafu,
};

/// Default page size for the paginated reader.
pub const DEFAULT_PAGE_SIZE: usize = 5;
/// Default number of records sampled per facet during inference.
pub const DEFAULT_SAMPLE_SIZE: usize = 1000;
/// Default number of deliveries before a message is dead-lettered.
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 3;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Source document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Storage URL whose top-level prefixes are collections.
    /// Examples: "s3://bucket/export", "/var/lib/export", "memory://"
    pub url: String,

    /// Storage options (credentials, region, endpoint).
    #[serde(default)]
    pub storage_options: HashMap<String, String>,

    /// Conventional last-modified field names, tried in order for the sort key.
    #[serde(default = "default_sort_key_fields")]
    pub sort_key_fields: Vec<String>,
}

fn default_sort_key_fields() -> Vec<String> {
    ["updatedAt", "updated_at", "lastModifiedAt", "modifiedAt"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Target table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Where the table snapshot is loaded from and saved to.
    /// Without it the table lives only for the duration of the run.
    #[serde(default)]
    pub snapshot_url: Option<String>,

    /// Storage options for the snapshot location.
    #[serde(default)]
    pub storage_options: HashMap<String, String>,

    /// Records sampled per facet during schema inference (default: 1000).
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            snapshot_url: None,
            storage_options: HashMap::new(),
            sample_size: default_sample_size(),
        }
    }
}

fn default_sample_size() -> usize {
    DEFAULT_SAMPLE_SIZE
}

/// Pending-write queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Deliveries before a message is dead-lettered (default: 3).
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,

    /// Storage URL for dead-letter NDJSON files (optional).
    #[serde(default)]
    pub dlq_path: Option<String>,

    /// Storage options for the DLQ location.
    #[serde(default)]
    pub dlq_storage_options: HashMap<String, String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_receive_count: default_max_receive_count(),
            dlq_path: None,
            dlq_storage_options: HashMap::new(),
        }
    }
}

fn default_max_receive_count() -> u32 {
    DEFAULT_MAX_RECEIVE_COUNT
}

/// Merge writer pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Number of concurrent writer tasks (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Read loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Documents fetched per page (default: 5).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Wait between depth probes while only the queue backlog keeps the loop
    /// alive, in milliseconds (default: 200).
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            drain_interval_ms: default_drain_interval_ms(),
        }
    }
}

impl OrchestratorConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_drain_interval_ms() -> u64 {
    200
}

/// Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether the endpoint is served (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Bind address (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Configuration for `source_url` with every other setting defaulted.
    pub fn for_source(source_url: impl Into<String>) -> Self {
        Self {
            source: SourceConfig {
                url: source_url.into(),
                storage_options: HashMap::new(),
                sort_key_fields: default_sort_key_fields(),
            },
            target: TargetConfig::default(),
            queue: QueueConfig::default(),
            writer: WriterConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    /// Load configuration from a YAML file, interpolating environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, interpolating environment variables.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let content = vars::interpolate(content).map_err(|errors| {
            EnvInterpolationSnafu {
                message: errors.join("\n"),
            }
            .build()
        })?;

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.url.is_empty(), EmptySourceUrlSnafu);
        ensure!(self.orchestrator.page_size > 0, InvalidPageSizeSnafu);
        ensure!(self.target.sample_size > 0, InvalidSampleSizeSnafu);
        ensure!(self.writer.concurrency > 0, InvalidConcurrencySnafu);
        ensure!(self.queue.max_receive_count > 0, InvalidMaxReceiveCountSnafu);
        Ok(())
    }
}
