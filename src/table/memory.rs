//! In-process target table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use super::{TableSnapshot, TargetTable};
use crate::error::TableError;
use crate::record::{MetaRecord, RecordKey, TargetRecord};
use crate::schema::PseudoSchema;

type SourceIndexKey = (String, DateTime<Utc>, RecordKey);
type FacetIndexKey = (String, String, RecordKey);

#[derive(Debug, Default)]
struct TableState {
    records: BTreeMap<RecordKey, TargetRecord>,
    by_source: BTreeSet<SourceIndexKey>,
    by_facet: BTreeSet<FacetIndexKey>,
    meta: Option<MetaRecord>,
}

fn source_index_key(record: &TargetRecord) -> SourceIndexKey {
    (
        record.source_id.clone(),
        record.source_updated_at,
        record.key(),
    )
}

fn facet_index_key(record: &TargetRecord) -> FacetIndexKey {
    (record.facet.clone(), record.sk.clone(), record.key())
}

impl TableState {
    fn put(&mut self, record: TargetRecord) {
        if let Some(previous) = self.records.get(&record.key()) {
            self.by_source.remove(&source_index_key(previous));
            self.by_facet.remove(&facet_index_key(previous));
        }
        self.by_source.insert(source_index_key(&record));
        self.by_facet.insert(facet_index_key(&record));
        self.records.insert(record.key(), record);
    }

    fn meta_mut(&mut self) -> &mut MetaRecord {
        self.meta.get_or_insert_with(MetaRecord::default)
    }
}

/// A [`TargetTable`] held in memory, with both secondary indexes kept in
/// step with the primary map on every write.
#[derive(Debug, Default)]
pub struct MemoryTable {
    state: RwLock<TableState>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table, including its indexes, from a snapshot.
    pub fn from_snapshot(snapshot: TableSnapshot) -> Self {
        let mut state = TableState {
            meta: snapshot.meta,
            ..TableState::default()
        };
        for record in snapshot.records {
            state.put(record);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    /// Copy of the table contents, records in key order.
    pub async fn snapshot(&self) -> TableSnapshot {
        let state = self.state.read().await;
        TableSnapshot {
            records: state.records.values().cloned().collect(),
            meta: state.meta.clone(),
        }
    }

    /// Number of stored target records, excluding the meta record.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TargetTable for MemoryTable {
    async fn find_by_source_id(&self, source_id: &str) -> Result<Vec<TargetRecord>, TableError> {
        let state = self.state.read().await;
        let start = (
            source_id.to_string(),
            DateTime::<Utc>::MIN_UTC,
            RecordKey::new("", ""),
        );
        Ok(state
            .by_source
            .range(start..)
            .take_while(|(id, _, _)| id == source_id)
            .filter_map(|(_, _, key)| state.records.get(key).cloned())
            .collect())
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<TargetRecord>, TableError> {
        Ok(self.state.read().await.records.get(key).cloned())
    }

    async fn put_batch(&self, records: Vec<TargetRecord>) -> Result<(), TableError> {
        let mut state = self.state.write().await;
        for record in records {
            state.put(record);
        }
        Ok(())
    }

    async fn query_facet(&self, facet: &str, limit: usize) -> Result<Vec<TargetRecord>, TableError> {
        let state = self.state.read().await;
        let start = (facet.to_string(), String::new(), RecordKey::new("", ""));
        Ok(state
            .by_facet
            .range(start..)
            .take_while(|(f, _, _)| f == facet)
            .take(limit)
            .filter_map(|(_, _, key)| state.records.get(key).cloned())
            .collect())
    }

    async fn meta(&self) -> Result<MetaRecord, TableError> {
        Ok(self.state.read().await.meta.clone().unwrap_or_default())
    }

    async fn add_facets(&self, facets: &BTreeSet<String>) -> Result<(), TableError> {
        let mut state = self.state.write().await;
        state.meta_mut().facets.extend(facets.iter().cloned());
        Ok(())
    }

    async fn put_pseudo_schema(&self, facet: &str, schema: PseudoSchema) -> Result<(), TableError> {
        let mut state = self.state.write().await;
        state
            .meta_mut()
            .pseudo_schema
            .insert(facet.to_string(), schema);
        Ok(())
    }
}
