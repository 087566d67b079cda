//! Error types for snowdrift using snafu.
//!
//! Each concern gets its own enum with context selectors; `PipelineError`
//! aggregates them at the step boundary.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Source URL is empty.
    #[snafu(display("Source URL cannot be empty"))]
    EmptySourceUrl,

    /// Page size must be positive.
    #[snafu(display("Page size must be greater than zero"))]
    InvalidPageSize,

    /// Sample size must be positive.
    #[snafu(display("Sample size must be greater than zero"))]
    InvalidSampleSize,

    /// Writer concurrency must be positive.
    #[snafu(display("Writer concurrency must be greater than zero"))]
    InvalidConcurrency,

    /// Max receive count must be positive.
    #[snafu(display("Queue max_receive_count must be greater than zero"))]
    InvalidMaxReceiveCount,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },
}

// ============ Source Errors ============

/// Errors raised by a source document store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// Underlying storage failed.
    #[snafu(display("Source storage error: {source}"))]
    SourceStorage { source: StorageError },

    /// A document could not be decoded as JSON.
    #[snafu(display("Failed to decode document {path}: {source}"))]
    DocumentDecode {
        path: String,
        source: serde_json::Error,
    },

    /// A document decoded to something other than a JSON object.
    #[snafu(display("Document {path} is not a JSON object"))]
    NotAnObject { path: String },

    /// The store refused or failed the request.
    #[snafu(display("Source unavailable: {message}"))]
    SourceUnavailable { message: String },
}

// ============ Table Errors ============

/// Errors raised by the target table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TableError {
    /// The table refused or failed the request.
    #[snafu(display("Table unavailable: {message}"))]
    TableUnavailable { message: String },

    /// Snapshot storage failed.
    #[snafu(display("Table snapshot storage error: {source}"))]
    SnapshotStorage { source: StorageError },

    /// Snapshot could not be encoded or decoded.
    #[snafu(display("Table snapshot is corrupted: {source}"))]
    SnapshotCodec { source: serde_json::Error },
}

// ============ Queue Errors ============

/// Errors raised by the pending-write queue.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// Batch could not be serialized into a message body.
    #[snafu(display("Failed to encode queue message: {source}"))]
    MessageEncode { source: serde_json::Error },

    /// Message body could not be decoded into a batch.
    #[snafu(display("Failed to decode queue message {message_id}: {source}"))]
    MessageDecode {
        message_id: String,
        source: serde_json::Error,
    },

    /// The queue was closed.
    #[snafu(display("Queue is closed"))]
    QueueClosed,

    /// Ack or nack for a receipt that is not in flight.
    #[snafu(display("Unknown receipt: {receipt}"))]
    UnknownReceipt { receipt: String },

    /// The queue could not report its depth.
    #[snafu(display("Queue depth probe failed: {message}"))]
    DepthProbe { message: String },
}

// ============ DLQ Errors ============

/// Errors that can occur during Dead Letter Queue operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
// Prefix is intentional to avoid snafu selector conflicts (e.g., WriteSnafu)
#[allow(clippy::enum_variant_names)]
pub enum DlqError {
    /// Failed to write to DLQ.
    #[snafu(display("Failed to write to DLQ: {source}"))]
    DlqWrite { source: StorageError },

    /// Failed to serialize dead letter.
    #[snafu(display("Failed to serialize DLQ record: {source}"))]
    DlqSerialize { source: serde_json::Error },

    /// Failed to create DLQ storage provider.
    #[snafu(display("Failed to create DLQ storage: {source}"))]
    DlqStorage { source: StorageError },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder: {source}"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Schema Inference Errors ============

/// Errors raised while inferring a facet's pseudo-schema.
///
/// These are scoped to a single facet: the inferencer logs them and moves on.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum SchemaInferenceError {
    /// A list mixes scalar families (e.g. numbers and strings).
    #[snafu(display("Field '{field}' is a heterogeneous list"))]
    HeterogeneousList { field: String },

    /// A list contains nested lists or maps.
    #[snafu(display("Field '{field}' is a list of non-scalar values"))]
    NonScalarListElement { field: String },

    /// Two composite types resolved to the same name.
    #[snafu(display("Composite type name '{name}' is already taken"))]
    TypeNameCollision { name: String },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage error.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Source store error.
    #[snafu(display("Source error: {source}"))]
    Source { source: SourceError },

    /// Target table error.
    #[snafu(display("Table error: {source}"))]
    Table { source: TableError },

    /// Queue error.
    #[snafu(display("Queue error: {source}"))]
    Queue { source: QueueError },

    /// DLQ error.
    #[snafu(display("DLQ error: {source}"))]
    Dlq { source: DlqError },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },

    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Task join error.
    #[snafu(display("Task join error: {source}"))]
    TaskJoin { source: tokio::task::JoinError },
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<StorageError> for PipelineError {
    fn from(source: StorageError) -> Self {
        PipelineError::Storage { source }
    }
}

impl From<SourceError> for PipelineError {
    fn from(source: SourceError) -> Self {
        PipelineError::Source { source }
    }
}

impl From<TableError> for PipelineError {
    fn from(source: TableError) -> Self {
        PipelineError::Table { source }
    }
}

impl From<QueueError> for PipelineError {
    fn from(source: QueueError) -> Self {
        PipelineError::Queue { source }
    }
}

impl From<DlqError> for PipelineError {
    fn from(source: DlqError) -> Self {
        PipelineError::Dlq { source }
    }
}

impl From<MetricsError> for PipelineError {
    fn from(source: MetricsError) -> Self {
        PipelineError::Metrics { source }
    }
}
