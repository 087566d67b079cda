//! Merge writer.
//!
//! Reconciles an incoming batch with what the table already holds. The
//! merge is a pure function of `(existing, incoming)`: incoming fields
//! overwrite, fields the incoming document lacks are preserved, and the
//! stored record's `(pk, sk)` wins over freshly derived keys. Applying the
//! same batch twice therefore leaves the table unchanged the second time.

use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::emit;
use crate::error::TableError;
use crate::metrics::events::{DuplicateSourceMatch, MergeBatchCompleted, RecordsWritten};
use crate::record::TargetRecord;
use crate::table::TargetTable;

/// Merge `incoming` over `existing`.
pub fn merge_record(existing: Option<&TargetRecord>, incoming: TargetRecord) -> TargetRecord {
    let Some(existing) = existing else {
        return incoming;
    };

    let mut fields = existing.fields.clone();
    fields.extend(incoming.fields);

    TargetRecord {
        pk: existing.pk.clone(),
        sk: existing.sk.clone(),
        facet: incoming.facet,
        source_id: incoming.source_id,
        source_updated_at: incoming.source_updated_at,
        fields,
    }
}

/// What one batch did to the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub records_written: usize,
    /// Lookups that found more than one stored record for a source id.
    pub duplicate_matches: usize,
    pub facets: BTreeSet<String>,
}

/// Applies queued batches to the table.
///
/// An incoming document matches stored records by source id within its own
/// facet only; when several match, the one with the oldest source timestamp
/// is merged into and the duplicate is counted.
#[derive(Clone)]
pub struct MergeWriter {
    table: Arc<dyn TargetTable>,
}

impl MergeWriter {
    pub fn new(table: Arc<dyn TargetTable>) -> Self {
        Self { table }
    }

    /// Merge and write one batch, then register its facets.
    pub async fn apply_batch(&self, batch: Vec<TargetRecord>) -> Result<MergeOutcome, TableError> {
        let start = Instant::now();
        let mut outcome = MergeOutcome::default();
        // Keyed by (facet, source id) so in-batch duplicates merge in order.
        let mut merged: IndexMap<(String, String), TargetRecord> = IndexMap::new();

        for incoming in batch {
            let identity = (incoming.facet.clone(), incoming.source_id.clone());
            let existing = match merged.get(&identity) {
                Some(pending) => Some(pending.clone()),
                None => self.lookup(&incoming, &mut outcome).await?,
            };
            merged.insert(identity, merge_record(existing.as_ref(), incoming));
        }

        if merged.is_empty() {
            return Ok(outcome);
        }

        outcome.facets = merged.values().map(|r| r.facet.clone()).collect();
        outcome.records_written = merged.len();

        self.table.put_batch(merged.into_values().collect()).await?;
        self.table.add_facets(&outcome.facets).await?;

        emit!(RecordsWritten {
            count: outcome.records_written as u64
        });
        emit!(MergeBatchCompleted {
            duration: start.elapsed()
        });
        debug!(
            records = outcome.records_written,
            facets = ?outcome.facets,
            "Applied batch"
        );
        Ok(outcome)
    }

    /// Stored record for the incoming document's source id, if any.
    ///
    /// With several matches the one with the oldest source timestamp wins;
    /// the duplicate is reported rather than silently ignored.
    async fn lookup(
        &self,
        incoming: &TargetRecord,
        outcome: &mut MergeOutcome,
    ) -> Result<Option<TargetRecord>, TableError> {
        let mut matches: Vec<TargetRecord> = self
            .table
            .find_by_source_id(&incoming.source_id)
            .await?
            .into_iter()
            .filter(|r| r.facet == incoming.facet)
            .collect();

        if matches.len() > 1 {
            warn!(
                facet = %incoming.facet,
                document_id = %incoming.source_id,
                matches = matches.len(),
                keys = ?matches.iter().map(|r| r.key().to_string()).collect::<Vec<_>>(),
                "Several records share a source document id, merging into the oldest"
            );
            emit!(DuplicateSourceMatch {
                matches: matches.len()
            });
            outcome.duplicate_matches += 1;
        }

        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0))
        })
    }
}
