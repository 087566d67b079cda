//! Internal events for metrics emission.
//!
//! Each struct is a measurable occurrence in the sync. Emitting one records
//! the matching Prometheus counter, gauge or histogram.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Reader events
// ============================================================================

/// Documents fetched from one source page.
pub struct DocumentsRead {
    pub collection: String,
    pub count: u64,
}

impl InternalEvent for DocumentsRead {
    fn emit(self) {
        trace!(collection = %self.collection, count = self.count, "Documents read");
        counter!("snowdrift_documents_read_total", "collection" => self.collection)
            .increment(self.count);
    }
}

/// A page fetch failed and was treated as an empty page.
pub struct PageFetchFailed {
    pub collection: String,
}

impl InternalEvent for PageFetchFailed {
    fn emit(self) {
        trace!(collection = %self.collection, "Page fetch failed");
        counter!("snowdrift_page_fetch_failures_total", "collection" => self.collection)
            .increment(1);
    }
}

/// A source document could not be decoded and was left out of its page.
pub struct DocumentSkipped {
    pub collection: String,
}

impl InternalEvent for DocumentSkipped {
    fn emit(self) {
        trace!(collection = %self.collection, "Document skipped");
        counter!("snowdrift_documents_skipped_total", "collection" => self.collection)
            .increment(1);
    }
}

/// A batch was handed to the pending-write queue.
pub struct BatchEnqueued {
    pub records: u64,
}

impl InternalEvent for BatchEnqueued {
    fn emit(self) {
        trace!(records = self.records, "Batch enqueued");
        counter!("snowdrift_batches_enqueued_total").increment(1);
        counter!("snowdrift_records_enqueued_total").increment(self.records);
    }
}

// ============================================================================
// Writer events
// ============================================================================

/// Records persisted to the target table.
pub struct RecordsWritten {
    pub count: u64,
}

impl InternalEvent for RecordsWritten {
    fn emit(self) {
        trace!(count = self.count, "Records written");
        counter!("snowdrift_records_written_total").increment(self.count);
    }
}

/// More than one stored record carried the same source id.
pub struct DuplicateSourceMatch {
    pub matches: usize,
}

impl InternalEvent for DuplicateSourceMatch {
    fn emit(self) {
        trace!(matches = self.matches, "Duplicate source id match");
        counter!("snowdrift_duplicate_source_matches_total").increment(1);
    }
}

/// A batch merge completed.
pub struct MergeBatchCompleted {
    pub duration: Duration,
}

impl InternalEvent for MergeBatchCompleted {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "Merge batch completed");
        histogram!("snowdrift_merge_batch_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Number of writer tasks currently applying a batch.
pub struct ActiveWriters {
    pub count: usize,
}

impl InternalEvent for ActiveWriters {
    fn emit(self) {
        trace!(count = self.count, "Active writers");
        gauge!("snowdrift_active_writers").set(self.count as f64);
    }
}

// ============================================================================
// Queue events
// ============================================================================

/// Stage at which a queue message failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Decode,
    Merge,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Decode => "decode",
            FailureStage::Merge => "merge",
        }
    }
}

/// A message was returned to the queue for redelivery.
pub struct MessageNacked {
    pub stage: FailureStage,
}

impl InternalEvent for MessageNacked {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), "Message nacked");
        counter!("snowdrift_messages_nacked_total", "stage" => self.stage.as_str()).increment(1);
    }
}

/// A message exhausted its deliveries and was dead-lettered.
pub struct MessageDeadLettered {
    pub stage: FailureStage,
}

impl InternalEvent for MessageDeadLettered {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), "Message dead-lettered");
        counter!("snowdrift_messages_dead_lettered_total", "stage" => self.stage.as_str())
            .increment(1);
    }
}

/// Approximate number of messages waiting or in flight.
pub struct QueueDepth {
    pub depth: u64,
}

impl InternalEvent for QueueDepth {
    fn emit(self) {
        trace!(depth = self.depth, "Queue depth");
        gauge!("snowdrift_queue_depth").set(self.depth as f64);
    }
}

/// The depth probe failed and the governor reported zero.
pub struct DepthProbeFailed;

impl InternalEvent for DepthProbeFailed {
    fn emit(self) {
        trace!("Depth probe failed");
        counter!("snowdrift_depth_probe_failures_total").increment(1);
    }
}

// ============================================================================
// Schema events
// ============================================================================

/// Outcome of inferring one facet's schema.
#[derive(Debug, Clone, Copy)]
pub enum InferenceStatus {
    Persisted,
    Failed,
}

impl InferenceStatus {
    fn as_str(&self) -> &'static str {
        match self {
            InferenceStatus::Persisted => "persisted",
            InferenceStatus::Failed => "failed",
        }
    }
}

/// A facet's schema inference finished.
pub struct SchemaInferred {
    pub status: InferenceStatus,
}

impl InternalEvent for SchemaInferred {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Schema inferred");
        counter!("snowdrift_schema_inferences_total", "status" => self.status.as_str())
            .increment(1);
    }
}

// ============================================================================
// Orchestrator events
// ============================================================================

/// An orchestrator step completed.
pub struct StepCompleted {
    pub step: &'static str,
    pub duration: Duration,
}

impl InternalEvent for StepCompleted {
    fn emit(self) {
        trace!(step = self.step, duration_ms = self.duration.as_millis(), "Step completed");
        histogram!("snowdrift_step_duration_seconds", "step" => self.step)
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    List,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// A storage request completed.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
    pub duration: Duration,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request"
        );
        counter!(
            "snowdrift_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
        histogram!(
            "snowdrift_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
