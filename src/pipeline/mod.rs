//! Sync pipeline.
//!
//! Connects the source store, pending-write queue, writer pool and target
//! table into one resumable run.
//!
//! # Architecture
//!
//! - **Orchestrator**: single task stepping the read loop. Exactly one page
//!   read is in flight at a time.
//! - **Writer pool**: `writer.concurrency` tokio tasks draining the queue
//!   through the merge writer. Merges are commutative and idempotent, so the
//!   writers need no ordering or locking between them.
//! - The loop ends only once the source is exhausted and the queue is empty,
//!   after which facet schemas are inferred from what was written.

pub mod envelope;
pub mod keys;
pub mod orchestrator;
pub mod reader;
pub mod workers;
pub mod writer;

pub use envelope::ContinuationEnvelope;
pub use orchestrator::{Orchestrator, RunSummary, Step};
pub use workers::{WriterPool, WriterStats};
pub use writer::{MergeOutcome, MergeWriter};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::context::SyncContext;
use crate::dlq::{DeadLetterQueue, FailureStats};
use crate::error::PipelineError;
use crate::queue::MemoryQueue;
use crate::source::{ObjectStoreSource, SourceStore};
use crate::storage::StorageProvider;
use crate::table::{MemoryTable, load_snapshot, save_snapshot};

/// Statistics about a sync run.
#[derive(Debug, Default)]
pub struct SyncStats {
    pub run: RunSummary,
    pub writers: WriterStats,
    /// Dead-lettered messages by failure stage.
    pub failures: FailureStats,
}

/// Run the loop and the writer pool over an already-built context.
///
/// The queue is closed once the loop stops, whether it finished, was
/// cancelled or failed, and the writers are joined before returning.
pub async fn run_with_context(
    context: SyncContext,
    config: &Config,
    start: Step,
    shutdown: CancellationToken,
) -> Result<SyncStats, PipelineError> {
    let pool = WriterPool::spawn(
        config.writer.concurrency,
        context.queue.clone(),
        MergeWriter::new(context.table.clone()),
        shutdown.clone(),
    );

    let orchestrator = Orchestrator::new(context.clone(), config, shutdown);
    let result = orchestrator.run(start).await;

    context.queue.close().await;
    let writers = pool.join().await?;
    let run = result?;

    Ok(SyncStats {
        run,
        writers,
        failures: FailureStats::default(),
    })
}

/// Run a full sync as configured.
///
/// Reads collections from `source.url`, loads and saves the table snapshot
/// at `target.snapshot_url` when one is set, and writes dead letters to
/// `queue.dlq_path` when one is set.
pub async fn run_sync(
    config: Config,
    shutdown: CancellationToken,
) -> Result<SyncStats, PipelineError> {
    let source_storage = StorageProvider::for_url_with_options(
        &config.source.url,
        config.source.storage_options.clone(),
    )
    .await?;
    info!(source = source_storage.canonical_url(), "Source opened");
    let source = Arc::new(ObjectStoreSource::new(Arc::new(source_storage)));

    let snapshot_storage = match &config.target.snapshot_url {
        Some(url) => Some(
            StorageProvider::for_url_with_options(url, config.target.storage_options.clone())
                .await?,
        ),
        None => None,
    };
    let table = match &snapshot_storage {
        Some(storage) => MemoryTable::from_snapshot(load_snapshot(storage).await?),
        None => MemoryTable::new(),
    };

    let dlq = DeadLetterQueue::from_config(&config.queue)
        .await?
        .map(Arc::new);
    let mut queue = MemoryQueue::new(config.queue.max_receive_count);
    if let Some(dlq) = &dlq {
        queue = queue.with_dlq(dlq.clone());
    }

    let outputs = SyncOutputs {
        table: Arc::new(table),
        queue: Arc::new(queue),
        dlq,
        snapshot_storage,
    };
    run_and_persist(source, outputs, &config, shutdown).await
}

/// Where a run's durable results go once the writers have stopped.
struct SyncOutputs {
    table: Arc<MemoryTable>,
    queue: Arc<MemoryQueue>,
    dlq: Option<Arc<DeadLetterQueue>>,
    snapshot_storage: Option<StorageProvider>,
}

impl SyncOutputs {
    /// Flush dead letters and save the table snapshot.
    async fn persist(&self) -> Result<FailureStats, PipelineError> {
        let failures = match &self.dlq {
            Some(dlq) => dlq.finalize().await?,
            None => {
                let mut failures = FailureStats::default();
                for letter in self.queue.dead_letters().await {
                    failures.increment(letter.stage);
                }
                failures
            }
        };

        if let Some(storage) = &self.snapshot_storage {
            save_snapshot(storage, &self.table.snapshot().await).await?;
        }

        Ok(failures)
    }
}

/// Run the sync, then persist its outputs even when the run failed.
///
/// Merges committed and messages dead-lettered before a failure are kept.
/// A run error takes precedence over a persist error.
async fn run_and_persist(
    source: Arc<dyn SourceStore>,
    outputs: SyncOutputs,
    config: &Config,
    shutdown: CancellationToken,
) -> Result<SyncStats, PipelineError> {
    let context = SyncContext::new(source, outputs.table.clone(), outputs.queue.clone());
    let result = run_with_context(context, config, Step::Prime, shutdown).await;
    let persisted = outputs.persist().await;

    match result {
        Ok(mut stats) => {
            stats.failures = persisted?;
            Ok(stats)
        }
        Err(e) => {
            if let Err(persist_error) = persisted {
                error!(error = %persist_error, "Failed to persist outputs of failed sync");
            }
            Err(e)
        }
    }
}
