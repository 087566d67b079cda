//! Post-sync schema introspection over every registered facet.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use super::inference::infer_pseudo_schema_reserving;
use crate::emit;
use crate::error::{SchemaInferenceError, TableError};
use crate::metrics::events::{InferenceStatus, SchemaInferred};
use crate::table::TargetTable;

/// Per-facet results of one introspection pass.
#[derive(Debug, Default)]
pub struct IntrospectionReport {
    /// Facets whose schema was replaced.
    pub persisted: Vec<String>,
    /// Facets that kept their previous schema entry.
    pub failed: Vec<(String, SchemaInferenceError)>,
}

impl IntrospectionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Infers and persists a pseudo-schema for each facet in the registry.
pub struct SchemaInferencer {
    table: Arc<dyn TargetTable>,
    sample_size: usize,
}

impl SchemaInferencer {
    pub fn new(table: Arc<dyn TargetTable>, sample_size: usize) -> Self {
        Self { table, sample_size }
    }

    /// Run one pass over the registered facets in lexicographic order.
    ///
    /// An inference failure is scoped to its facet. Table errors abort the
    /// pass. Type names are unique across facets: a facet whose names are
    /// already held by another facet's persisted schema fails with
    /// `TypeNameCollision`.
    pub async fn run(&self) -> Result<IntrospectionReport, TableError> {
        let meta = self.table.meta().await?;
        let mut report = IntrospectionReport::default();

        let mut names_by_facet: BTreeMap<String, HashSet<String>> = meta
            .pseudo_schema
            .iter()
            .map(|(facet, schema)| {
                (
                    facet.clone(),
                    schema.type_names().map(str::to_string).collect(),
                )
            })
            .collect();

        for facet in meta.facets {
            let samples = self.table.query_facet(&facet, self.sample_size).await?;
            let reserved: HashSet<String> = names_by_facet
                .iter()
                .filter(|(owner, _)| **owner != facet)
                .flat_map(|(_, names)| names.iter().cloned())
                .collect();

            match infer_pseudo_schema_reserving(&facet, &samples, &reserved) {
                Ok(schema) => {
                    names_by_facet.insert(
                        facet.clone(),
                        schema.type_names().map(str::to_string).collect(),
                    );
                    info!(
                        facet = %facet,
                        samples = samples.len(),
                        aux_types = schema.auxiliary_type_pairs.len(),
                        "Inferred schema"
                    );
                    self.table.put_pseudo_schema(&facet, schema).await?;
                    emit!(SchemaInferred {
                        status: InferenceStatus::Persisted
                    });
                    report.persisted.push(facet);
                }
                Err(e) => {
                    warn!(facet = %facet, error = %e, "Schema inference failed, keeping previous schema");
                    emit!(SchemaInferred {
                        status: InferenceStatus::Failed
                    });
                    report.failed.push((facet, e));
                }
            }
        }

        Ok(report)
    }
}
