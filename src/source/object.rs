//! Source store over an exported document tree.
//!
//! Layout: each top-level directory is a collection and every `*.json`
//! object directly inside it is one document.
//!
//! ```text
//! export/
//!   customers/c-1.json
//!   orders/o-1.json
//!   orders/o-2.json
//! ```
//!
//! The document id is the file stem and the update time is the object's
//! last-modified timestamp. A document that fails to decode is skipped with a
//! warning; the rest of its page is still returned. Storage failures fail the
//! whole page.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use object_store::path::Path;
use snafu::prelude::*;
use tracing::{debug, warn};

use super::{SourceDocument, SourceStore};
use crate::emit;
use crate::error::{DocumentDecodeSnafu, NotAnObjectSnafu, SourceError, SourceStorageSnafu};
use crate::metrics::events::DocumentSkipped;
use crate::storage::{ObjectEntry, StorageProviderRef};
use crate::value::Value;

const DOCUMENT_EXTENSION: &str = ".json";
/// Documents of one page fetched at once. Order is preserved.
const FETCH_CONCURRENCY: usize = 8;

/// A [`SourceStore`] reading JSON documents from a storage location.
#[derive(Debug, Clone)]
pub struct ObjectStoreSource {
    storage: StorageProviderRef,
}

impl ObjectStoreSource {
    pub fn new(storage: StorageProviderRef) -> Self {
        Self { storage }
    }

    async fn decode(&self, entry: &ObjectEntry) -> Result<SourceDocument, SourceError> {
        let path = entry.path.to_string();
        let bytes = self.storage.get(&entry.path).await.context(SourceStorageSnafu)?;
        let json: serde_json::Value =
            serde_json::from_slice(&bytes).context(DocumentDecodeSnafu { path: &path })?;

        let Value::Map(fields) = Value::from(json) else {
            return NotAnObjectSnafu { path }.fail();
        };

        Ok(SourceDocument {
            id: document_id(&entry.path),
            fields,
            update_time: entry.last_modified,
        })
    }
}

fn document_id(path: &Path) -> String {
    let name = path.filename().unwrap_or_default();
    name.strip_suffix(DOCUMENT_EXTENSION).unwrap_or(name).to_string()
}

#[async_trait]
impl SourceStore for ObjectStoreSource {
    async fn list_collections(&self) -> Result<Vec<String>, SourceError> {
        let listing = self.storage.list_dir(None).await.context(SourceStorageSnafu)?;
        Ok(listing
            .prefixes
            .iter()
            .filter_map(|prefix| prefix.parts().last())
            .map(|part| part.as_ref().to_string())
            .collect())
    }

    async fn fetch_page(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SourceDocument>, SourceError> {
        let listing = self
            .storage
            .list_dir(Some(&Path::from(collection)))
            .await
            .context(SourceStorageSnafu)?;

        let entries: Vec<&ObjectEntry> = listing
            .objects
            .iter()
            .filter(|entry| entry.path.as_ref().ends_with(DOCUMENT_EXTENSION))
            .skip(offset)
            .take(limit)
            .collect();

        debug!(collection, offset, count = entries.len(), "Fetching document page");

        let fetches: Vec<_> = entries.into_iter().map(|entry| self.decode(entry)).collect();
        let results: Vec<Result<SourceDocument, SourceError>> = stream::iter(fetches)
            .buffered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut documents = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(document) => documents.push(document),
                Err(e @ (SourceError::DocumentDecode { .. } | SourceError::NotAnObject { .. })) => {
                    warn!(collection, error = %e, "Skipping undecodable document");
                    emit!(DocumentSkipped {
                        collection: collection.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(documents)
    }
}
