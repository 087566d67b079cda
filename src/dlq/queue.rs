//! Buffered NDJSON writer for dead letters.

use bytes::Bytes;
use chrono::Utc;
use object_store::PutPayload;
use object_store::path::Path;
use snafu::prelude::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::QueueConfig;
use crate::error::{DlqError, DlqSerializeSnafu, DlqStorageSnafu, DlqWriteSnafu};
use crate::storage::StorageProvider;

use super::types::{DeadLetter, FailureStats};

/// Entries buffered before an automatic flush.
const FLUSH_THRESHOLD: usize = 100;

#[derive(Debug, Default)]
struct DlqState {
    buffer: Vec<DeadLetter>,
    stats: FailureStats,
    parts_written: usize,
}

/// Writes dead letters to `dead-letters-<run>-<part>.ndjson` objects.
///
/// Each flush writes a new part, so earlier flushes are never overwritten.
#[derive(Debug)]
pub struct DeadLetterQueue {
    storage: Arc<StorageProvider>,
    run_id: String,
    state: Mutex<DlqState>,
}

impl DeadLetterQueue {
    /// Build the DLQ from queue configuration. `None` without a `dlq_path`.
    pub async fn from_config(config: &QueueConfig) -> Result<Option<Self>, DlqError> {
        let Some(dlq_path) = &config.dlq_path else {
            return Ok(None);
        };

        let storage =
            StorageProvider::for_url_with_options(dlq_path, config.dlq_storage_options.clone())
                .await
                .context(DlqStorageSnafu)?;

        info!(location = storage.canonical_url(), "DLQ enabled");
        Ok(Some(Self::new(Arc::new(storage))))
    }

    pub fn new(storage: Arc<StorageProvider>) -> Self {
        Self {
            storage,
            run_id: Utc::now().format("%Y%m%d-%H%M%S").to_string(),
            state: Mutex::new(DlqState::default()),
        }
    }

    /// Buffer a dead letter, flushing once the buffer is full.
    pub async fn record(&self, letter: DeadLetter) {
        debug!(
            message_id = %letter.message_id,
            stage = letter.stage.as_str(),
            "Recording dead letter"
        );

        let should_flush = {
            let mut state = self.state.lock().await;
            state.stats.increment(letter.stage);
            state.buffer.push(letter);
            state.buffer.len() >= FLUSH_THRESHOLD
        };

        if should_flush && let Err(e) = self.flush().await {
            error!(error = %e, "Failed to flush DLQ");
        }
    }

    /// Write buffered dead letters as a new NDJSON part.
    pub async fn flush(&self) -> Result<(), DlqError> {
        let mut state = self.state.lock().await;
        if state.buffer.is_empty() {
            return Ok(());
        }

        let mut ndjson = String::new();
        for letter in &state.buffer {
            ndjson.push_str(&serde_json::to_string(letter).context(DlqSerializeSnafu)?);
            ndjson.push('\n');
        }

        let path = Path::from(format!(
            "dead-letters-{}-{:04}.ndjson",
            self.run_id, state.parts_written
        ));
        self.storage
            .put_payload(&path, PutPayload::from(Bytes::from(ndjson)))
            .await
            .context(DlqWriteSnafu)?;

        let count = state.buffer.len();
        state.buffer.clear();
        state.parts_written += 1;
        info!(count, %path, "Flushed dead letters");
        Ok(())
    }

    /// Flush what is left and log the per-stage totals.
    pub async fn finalize(&self) -> Result<FailureStats, DlqError> {
        self.flush().await?;
        let stats = self.state.lock().await.stats;
        info!(
            total = stats.total(),
            decode = stats.decode,
            merge = stats.merge,
            "DLQ finalized"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::events::FailureStage;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn letter(id: &str, stage: FailureStage) -> DeadLetter {
        DeadLetter {
            message_id: id.to_string(),
            body: "[]".to_string(),
            error: "boom".to_string(),
            stage,
            receive_count: 3,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_from_config_none_without_path() {
        let dlq = DeadLetterQueue::from_config(&QueueConfig::default())
            .await
            .unwrap();
        assert!(dlq.is_none());
    }

    #[tokio::test]
    async fn test_finalize_writes_ndjson() {
        let temp_dir = TempDir::new().unwrap();
        let config = QueueConfig {
            dlq_path: Some(temp_dir.path().to_str().unwrap().to_string()),
            dlq_storage_options: HashMap::new(),
            ..QueueConfig::default()
        };
        let dlq = DeadLetterQueue::from_config(&config).await.unwrap().unwrap();

        dlq.record(letter("m-1", FailureStage::Merge)).await;
        dlq.record(letter("m-2", FailureStage::Decode)).await;
        let stats = dlq.finalize().await.unwrap();
        assert_eq!(stats.total(), 2);

        let files: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().into_string().unwrap();
        assert!(name.starts_with("dead-letters-"));
        assert!(name.ends_with(".ndjson"));

        let content = std::fs::read_to_string(files[0].path()).unwrap();
        let lines: Vec<DeadLetter> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].message_id, "m-1");
        assert_eq!(lines[1].stage, FailureStage::Decode);
    }

    #[tokio::test]
    async fn test_each_flush_writes_a_new_part() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_url_with_options(
            temp_dir.path().to_str().unwrap(),
            HashMap::new(),
        )
        .await
        .unwrap();
        let dlq = DeadLetterQueue::new(Arc::new(storage));

        for i in 0..FLUSH_THRESHOLD {
            dlq.record(letter(&format!("m-{i}"), FailureStage::Merge)).await;
        }
        dlq.record(letter("tail", FailureStage::Merge)).await;
        dlq.finalize().await.unwrap();

        let count = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(count, 2);
    }
}
