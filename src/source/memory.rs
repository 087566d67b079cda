//! In-process source store.

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;

use super::{SourceDocument, SourceStore};
use crate::error::SourceError;

/// A source held in memory. Collections keep insertion order, and so do
/// the documents inside them.
#[derive(Debug, Default)]
pub struct MemorySource {
    collections: RwLock<IndexMap<String, IndexMap<String, SourceDocument>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`MemorySource::insert_all`].
    pub fn with_collection(
        mut self,
        collection: impl Into<String>,
        documents: impl IntoIterator<Item = SourceDocument>,
    ) -> Self {
        let entry = self
            .collections
            .get_mut()
            .entry(collection.into())
            .or_default();
        for document in documents {
            entry.insert(document.id.clone(), document);
        }
        self
    }

    /// Insert or replace a document. A replaced document keeps its position.
    pub async fn insert(&self, collection: &str, document: SourceDocument) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(document.id.clone(), document);
    }

    pub async fn insert_all(
        &self,
        collection: &str,
        documents: impl IntoIterator<Item = SourceDocument>,
    ) {
        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        for document in documents {
            entry.insert(document.id.clone(), document);
        }
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn list_collections(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.collections.read().await.keys().cloned().collect())
    }

    async fn fetch_page(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SourceDocument>, SourceError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
