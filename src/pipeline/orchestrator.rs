//! Resumable sync loop.
//!
//! The loop is a chain of [`Step`] values. Each call to
//! [`Orchestrator::step`] consumes one and returns the next:
//!
//! ```text
//! Prime -> Read -> Enqueue -> Decide -> Read ... -> Introspect -> Done
//!            \------------> Decide (empty page)
//! ```
//!
//! Every step that carries an envelope can be persisted and fed back in
//! later, so a run interrupted between steps resumes at `Read`.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::envelope::ContinuationEnvelope;
use super::reader::PaginatedReader;
use crate::config::Config;
use crate::context::SyncContext;
use crate::emit;
use crate::error::PipelineError;
use crate::metrics::events::{BatchEnqueued, StepCompleted};
use crate::queue::BackpressureGovernor;
use crate::record::TargetRecord;
use crate::schema::{IntrospectionReport, SchemaInferencer};

/// One state of the sync loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Enumerate collections and build the first envelope.
    Prime,
    /// Read the page the envelope points at.
    Read(ContinuationEnvelope),
    /// Hand a non-empty page to the pending-write queue.
    Enqueue {
        envelope: ContinuationEnvelope,
        records: Vec<TargetRecord>,
    },
    /// Loop again or move on to introspection.
    Decide(ContinuationEnvelope),
    /// Infer and persist facet schemas.
    Introspect,
    Done,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Prime => "prime",
            Step::Read(_) => "read",
            Step::Enqueue { .. } => "enqueue",
            Step::Decide(_) => "decide",
            Step::Introspect => "introspect",
            Step::Done => "done",
        }
    }

    pub fn envelope(&self) -> Option<&ContinuationEnvelope> {
        match self {
            Step::Read(envelope) | Step::Decide(envelope) => Some(envelope),
            Step::Enqueue { envelope, .. } => Some(envelope),
            Step::Prime | Step::Introspect | Step::Done => None,
        }
    }
}

/// What one orchestrator run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub steps: usize,
    pub pages_read: usize,
    pub documents_read: usize,
    pub batches_enqueued: usize,
    /// Envelope of the last step taken, for resuming a cancelled run.
    pub last_envelope: Option<ContinuationEnvelope>,
    pub cancelled: bool,
    pub introspection: Option<IntrospectionReport>,
}

pub struct Orchestrator {
    context: SyncContext,
    reader: PaginatedReader,
    inferencer: SchemaInferencer,
    page_size: usize,
    drain_interval: Duration,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(context: SyncContext, config: &Config, shutdown: CancellationToken) -> Self {
        let reader = PaginatedReader::new(
            context.source.clone(),
            BackpressureGovernor::new(context.queue.clone()),
            config.orchestrator.page_size,
            config.source.sort_key_fields.clone(),
        );
        let inferencer = SchemaInferencer::new(context.table.clone(), config.target.sample_size);

        Self {
            context,
            reader,
            inferencer,
            page_size: config.orchestrator.page_size,
            drain_interval: config.orchestrator.drain_interval(),
            shutdown,
        }
    }

    /// Drive the loop from `start` until `Done` or cancellation.
    ///
    /// Cancellation is honoured between steps only; a cancelled run reports
    /// the envelope it stopped at.
    pub async fn run(&self, start: Step) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();
        let mut step = start;

        while step != Step::Done {
            if self.shutdown.is_cancelled() {
                warn!(
                    step = step.name(),
                    envelope = ?summary.last_envelope,
                    "Sync cancelled between steps"
                );
                summary.cancelled = true;
                return Ok(summary);
            }

            if let Some(envelope) = step.envelope() {
                summary.last_envelope = Some(envelope.clone());
            }

            let name = step.name();
            let started = Instant::now();
            step = self.step(step, &mut summary).await?;
            summary.steps += 1;
            emit!(StepCompleted {
                step: name,
                duration: started.elapsed(),
            });
        }

        info!(
            steps = summary.steps,
            pages = summary.pages_read,
            documents = summary.documents_read,
            batches = summary.batches_enqueued,
            "Sync loop finished"
        );
        Ok(summary)
    }

    /// Execute one step.
    pub async fn step(&self, step: Step, summary: &mut RunSummary) -> Result<Step, PipelineError> {
        match step {
            Step::Prime => {
                let collections = self.context.source.list_collections().await?;
                info!(collections = ?collections, "Enumerated source collections");
                Ok(Step::Read(ContinuationEnvelope::prime(
                    collections,
                    self.page_size,
                )))
            }

            Step::Read(envelope) => {
                let page = self.reader.read(envelope).await;
                summary.pages_read += 1;
                if page.records.is_empty() {
                    Ok(Step::Decide(page.envelope))
                } else {
                    Ok(Step::Enqueue {
                        envelope: page.envelope,
                        records: page.records,
                    })
                }
            }

            Step::Enqueue { envelope, records } => {
                self.context.queue.send(&records).await?;
                summary.documents_read += records.len();
                summary.batches_enqueued += 1;
                emit!(BatchEnqueued {
                    records: records.len() as u64
                });
                debug!(
                    collection = ?envelope.collection,
                    offset = envelope.offset,
                    records = records.len(),
                    "Enqueued page"
                );
                Ok(Step::Decide(envelope))
            }

            Step::Decide(envelope) => {
                if !envelope.should_continue {
                    return Ok(Step::Introspect);
                }
                if envelope.collection.is_none() {
                    self.wait_for_drain().await;
                }
                Ok(Step::Read(envelope))
            }

            Step::Introspect => {
                let report = self.inferencer.run().await?;
                info!(
                    persisted = report.persisted.len(),
                    failed = report.failed.len(),
                    "Schema introspection finished"
                );
                summary.introspection = Some(report);
                Ok(Step::Done)
            }

            Step::Done => Ok(Step::Done),
        }
    }

    /// Only the queue backlog keeps the loop alive: pause before probing again.
    async fn wait_for_drain(&self) {
        debug!(interval_ms = self.drain_interval.as_millis(), "Waiting for queue to drain");
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.drain_interval) => {}
        }
    }
}
