//! Paginated reader.
//!
//! Reads one page of the current collection per call, transforms it into
//! target-shaped records and returns the advanced envelope. Source errors
//! are soft: the page reads as empty and the reader moves on.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::envelope::ContinuationEnvelope;
use super::keys::KeyPlan;
use crate::emit;
use crate::metrics::events::{DocumentsRead, PageFetchFailed};
use crate::queue::BackpressureGovernor;
use crate::record::TargetRecord;
use crate::source::{SourceDocument, SourceStore};

/// One page read, plus the envelope for the next step.
#[derive(Debug, Clone)]
pub struct PageRead {
    pub records: Vec<TargetRecord>,
    pub envelope: ContinuationEnvelope,
}

pub struct PaginatedReader {
    source: Arc<dyn SourceStore>,
    governor: BackpressureGovernor,
    page_size: usize,
    sort_key_fields: Vec<String>,
}

impl PaginatedReader {
    pub fn new(
        source: Arc<dyn SourceStore>,
        governor: BackpressureGovernor,
        page_size: usize,
        sort_key_fields: Vec<String>,
    ) -> Self {
        Self {
            source,
            governor,
            page_size,
            sort_key_fields,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Read the next page described by `envelope`.
    pub async fn read(&self, mut envelope: ContinuationEnvelope) -> PageRead {
        if envelope.collection.is_none() {
            envelope.advance_collection(self.page_size);
        }

        let documents = match envelope.collection.clone() {
            Some(collection) => self.fetch(&collection, &envelope).await,
            None => Vec::new(),
        };
        let depth = self.governor.probe().await;

        if !documents.is_empty()
            && let Some(collection) = envelope.collection.clone()
        {
            let plan = KeyPlan::from_hints(
                envelope.partition_key.as_deref(),
                envelope.sort_key.as_deref(),
            )
            .unwrap_or_else(|| KeyPlan::derive(&collection, &documents[0], &self.sort_key_fields));

            let records: Vec<TargetRecord> = documents
                .into_iter()
                .map(|doc| plan.transform(&collection, doc))
                .collect();

            envelope.partition_key = Some(plan.partition_field);
            envelope.sort_key = Some(plan.sort_field);
            envelope.offset += envelope.limit;
            envelope.should_continue = true;

            return PageRead { records, envelope };
        }

        if let Some(finished) = &envelope.collection {
            info!(collection = %finished, documents = envelope.offset, "Collection exhausted");
        }
        let next = envelope.advance_collection(self.page_size).map(str::to_string);
        envelope.should_continue = BackpressureGovernor::must_continue(false, next.is_some(), depth);
        debug!(next = ?next, depth, "Advanced to next collection");

        PageRead {
            records: Vec::new(),
            envelope,
        }
    }

    async fn fetch(&self, collection: &str, envelope: &ContinuationEnvelope) -> Vec<SourceDocument> {
        match self
            .source
            .fetch_page(collection, envelope.limit, envelope.offset)
            .await
        {
            Ok(documents) => {
                debug!(
                    collection,
                    offset = envelope.offset,
                    limit = envelope.limit,
                    count = documents.len(),
                    "Fetched page"
                );
                emit!(DocumentsRead {
                    collection: collection.to_string(),
                    count: documents.len() as u64,
                });
                documents
            }
            Err(e) => {
                warn!(
                    collection,
                    offset = envelope.offset,
                    error = %e,
                    "Page fetch failed, treating as empty"
                );
                emit!(PageFetchFailed {
                    collection: collection.to_string(),
                });
                Vec::new()
            }
        }
    }
}
