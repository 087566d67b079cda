//! The partitioned key-value target table.
//!
//! Records are addressed by `(pk, sk)`. Two secondary indexes are required:
//! `(facet, sk)` for schema sampling and `(source id, source timestamp)` for
//! lookup-before-write. Readers and writers tolerate stale indexes.

mod memory;
mod snapshot;

pub use memory::MemoryTable;
pub use snapshot::{SNAPSHOT_FILE, TableSnapshot, load_snapshot, save_snapshot};

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::TableError;
use crate::record::{MetaRecord, RecordKey, TargetRecord};
use crate::schema::PseudoSchema;

#[async_trait]
pub trait TargetTable: Send + Sync {
    /// Records carrying `source_id`, oldest source timestamp first.
    async fn find_by_source_id(&self, source_id: &str) -> Result<Vec<TargetRecord>, TableError>;

    /// Point read by primary key.
    async fn get(&self, key: &RecordKey) -> Result<Option<TargetRecord>, TableError>;

    /// Write records as independent puts, replacing any record with the same key.
    async fn put_batch(&self, records: Vec<TargetRecord>) -> Result<(), TableError>;

    /// Up to `limit` records tagged with `facet`, in sort-key order.
    async fn query_facet(&self, facet: &str, limit: usize) -> Result<Vec<TargetRecord>, TableError>;

    /// The meta record. A table that never stored one returns the default.
    async fn meta(&self) -> Result<MetaRecord, TableError>;

    /// Set-union `facets` into the meta record's facet registry.
    async fn add_facets(&self, facets: &BTreeSet<String>) -> Result<(), TableError>;

    /// Replace the stored pseudo-schema of one facet.
    async fn put_pseudo_schema(&self, facet: &str, schema: PseudoSchema) -> Result<(), TableError>;
}
