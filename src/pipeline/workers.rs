//! Writer pool: concurrent queue consumers running the merge writer.

use futures::future::join_all;
use snafu::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::writer::MergeWriter;
use crate::emit;
use crate::error::{PipelineError, TaskJoinSnafu};
use crate::metrics::events::{ActiveWriters, FailureStage};
use crate::queue::{Delivery, PendingWriteQueue};

/// Totals over every worker in the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub batches_applied: usize,
    pub records_written: usize,
    pub duplicate_matches: usize,
    pub nacks: usize,
}

impl WriterStats {
    fn absorb(&mut self, other: WriterStats) {
        self.batches_applied += other.batches_applied;
        self.records_written += other.records_written;
        self.duplicate_matches += other.duplicate_matches;
        self.nacks += other.nacks;
    }
}

/// Handle to a running pool.
pub struct WriterPool {
    workers: Vec<JoinHandle<WriterStats>>,
}

struct Worker {
    id: usize,
    queue: Arc<dyn PendingWriteQueue>,
    writer: MergeWriter,
    active: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl WriterPool {
    /// Spawn `concurrency` workers. They stop when the queue is closed and
    /// drained, or when `shutdown` is cancelled between batches.
    pub fn spawn(
        concurrency: usize,
        queue: Arc<dyn PendingWriteQueue>,
        writer: MergeWriter,
        shutdown: CancellationToken,
    ) -> Self {
        let active = Arc::new(AtomicUsize::new(0));
        let workers = (0..concurrency)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: queue.clone(),
                    writer: writer.clone(),
                    active: active.clone(),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(concurrency, "Writer pool started");
        Self { workers }
    }

    /// Wait for every worker to stop and sum their stats.
    pub async fn join(self) -> Result<WriterStats, PipelineError> {
        let mut stats = WriterStats::default();
        for result in join_all(self.workers).await {
            stats.absorb(result.context(TaskJoinSnafu)?);
        }
        Ok(stats)
    }
}

impl Worker {
    async fn run(self) -> WriterStats {
        let mut stats = WriterStats::default();

        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                received = self.queue.receive() => received,
            };

            let delivery = match received {
                Ok(Some(delivery)) => delivery,
                Ok(None) => break,
                Err(e) => {
                    error!(worker = self.id, error = %e, "Queue receive failed, stopping worker");
                    break;
                }
            };

            let count = self.active.fetch_add(1, Ordering::Relaxed) + 1;
            emit!(ActiveWriters { count });

            self.handle(delivery, &mut stats).await;

            let count = self.active.fetch_sub(1, Ordering::Relaxed) - 1;
            emit!(ActiveWriters { count });
        }

        debug!(worker = self.id, ?stats, "Writer stopped");
        stats
    }

    async fn handle(&self, delivery: Delivery, stats: &mut WriterStats) {
        let receipt = delivery.receipt;

        let batch = match delivery.decode() {
            Ok(batch) => batch,
            Err(e) => {
                self.nack(&delivery, &e.to_string(), FailureStage::Decode, stats)
                    .await;
                return;
            }
        };

        match self.writer.apply_batch(batch).await {
            Ok(outcome) => {
                stats.batches_applied += 1;
                stats.records_written += outcome.records_written;
                stats.duplicate_matches += outcome.duplicate_matches;
                if let Err(e) = self.queue.ack(receipt).await {
                    warn!(worker = self.id, message_id = %delivery.message_id, error = %e, "Ack failed");
                }
            }
            Err(e) => {
                self.nack(&delivery, &e.to_string(), FailureStage::Merge, stats)
                    .await;
            }
        }
    }

    async fn nack(
        &self,
        delivery: &Delivery,
        error: &str,
        stage: FailureStage,
        stats: &mut WriterStats,
    ) {
        warn!(
            worker = self.id,
            message_id = %delivery.message_id,
            receive_count = delivery.receive_count,
            stage = stage.as_str(),
            error,
            "Batch failed"
        );
        stats.nacks += 1;
        if let Err(e) = self.queue.nack(delivery.receipt, error, stage).await {
            warn!(worker = self.id, message_id = %delivery.message_id, error = %e, "Nack failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableError;
    use crate::queue::MemoryQueue;
    use crate::record::{MetaRecord, RecordKey, TargetRecord};
    use crate::schema::PseudoSchema;
    use crate::table::{MemoryTable, TargetTable};
    use crate::value::Fields;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn record(id: &str) -> TargetRecord {
        TargetRecord {
            pk: id.to_string(),
            sk: "s".to_string(),
            facet: "orders".to_string(),
            source_id: id.to_string(),
            source_updated_at: Utc::now(),
            fields: Fields::new(),
        }
    }

    #[tokio::test]
    async fn test_pool_drains_queue() {
        let queue = Arc::new(MemoryQueue::new(3));
        let table = Arc::new(MemoryTable::new());
        for i in 0..10 {
            queue.send(&[record(&format!("d{i}"))]).await.unwrap();
        }

        let pool = WriterPool::spawn(
            3,
            queue.clone(),
            MergeWriter::new(table.clone()),
            CancellationToken::new(),
        );
        queue.close().await;
        let stats = pool.join().await.unwrap();

        assert_eq!(stats.batches_applied, 10);
        assert_eq!(table.len().await, 10);
        assert_eq!(queue.approximate_depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_message_is_dead_lettered() {
        let queue = Arc::new(MemoryQueue::new(2));
        let table = Arc::new(MemoryTable::new());
        queue.send(&[record("good")]).await.unwrap();
        queue.send_body("{not json".to_string()).await.unwrap();

        let pool = WriterPool::spawn(
            1,
            queue.clone(),
            MergeWriter::new(table.clone()),
            CancellationToken::new(),
        );
        queue.close().await;
        let stats = pool.join().await.unwrap();

        assert_eq!(stats.batches_applied, 1);
        assert_eq!(stats.nacks, 2);
        assert_eq!(table.len().await, 1);
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].stage, FailureStage::Decode);
        assert_eq!(dead[0].body, "{not json");
    }

    struct UnavailableTable;

    #[async_trait]
    impl TargetTable for UnavailableTable {
        async fn find_by_source_id(&self, _: &str) -> Result<Vec<TargetRecord>, TableError> {
            Err(TableError::TableUnavailable {
                message: "throttled".to_string(),
            })
        }
        async fn get(&self, _: &RecordKey) -> Result<Option<TargetRecord>, TableError> {
            Ok(None)
        }
        async fn put_batch(&self, _: Vec<TargetRecord>) -> Result<(), TableError> {
            Ok(())
        }
        async fn query_facet(&self, _: &str, _: usize) -> Result<Vec<TargetRecord>, TableError> {
            Ok(Vec::new())
        }
        async fn meta(&self) -> Result<MetaRecord, TableError> {
            Ok(MetaRecord::default())
        }
        async fn add_facets(&self, _: &BTreeSet<String>) -> Result<(), TableError> {
            Ok(())
        }
        async fn put_pseudo_schema(&self, _: &str, _: PseudoSchema) -> Result<(), TableError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_merge_is_retried_then_dead_lettered() {
        let queue = Arc::new(MemoryQueue::new(3));
        queue.send(&[record("d1")]).await.unwrap();

        let pool = WriterPool::spawn(
            1,
            queue.clone(),
            MergeWriter::new(Arc::new(UnavailableTable)),
            CancellationToken::new(),
        );
        queue.close().await;
        let stats = pool.join().await.unwrap();

        assert_eq!(stats.nacks, 3);
        assert_eq!(stats.batches_applied, 0);
        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].stage, FailureStage::Merge);
        assert_eq!(dead[0].receive_count, 3);
    }

    #[tokio::test]
    async fn test_cancellation_stops_idle_workers() {
        let queue = Arc::new(MemoryQueue::new(3));
        let shutdown = CancellationToken::new();
        let pool = WriterPool::spawn(
            2,
            queue,
            MergeWriter::new(Arc::new(MemoryTable::new())),
            shutdown.clone(),
        );

        shutdown.cancel();
        let stats = pool.join().await.unwrap();
        assert_eq!(stats, WriterStats::default());
    }
}
