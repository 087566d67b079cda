//! Source document stores.
//!
//! The pipeline consumes exactly two operations from a source: list the
//! top-level collections, and fetch one page of a collection by offset.

mod memory;
mod object;

pub use memory::MemorySource;
pub use object::ObjectStoreSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SourceError;
use crate::value::Fields;

/// A document as read from the source store.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// The document's natural id within its collection.
    pub id: String,
    pub fields: Fields,
    /// Last modification time reported by the store.
    pub update_time: DateTime<Utc>,
}

impl SourceDocument {
    pub fn new(id: impl Into<String>, fields: Fields, update_time: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            fields,
            update_time,
        }
    }
}

/// A document store the pipeline reads from.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Names of the top-level collections, in store-defined order.
    async fn list_collections(&self) -> Result<Vec<String>, SourceError>;

    /// Up to `limit` documents of `collection` starting at `offset`.
    ///
    /// Page order is store-defined but stable between calls. A collection
    /// that does not exist yields an empty page.
    async fn fetch_page(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SourceDocument>, SourceError>;
}
