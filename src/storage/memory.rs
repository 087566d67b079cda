//! In-process backend for tests and dry runs.

use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path;
use std::sync::Arc;

use super::{BackendConfig, StorageProvider};

impl StorageProvider {
    /// Every call returns a new, empty store. Clone the provider to share one.
    pub(super) fn construct_memory(key: Option<Path>) -> Self {
        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let canonical_url = match &key {
            Some(key) => format!("memory://{key}"),
            None => "memory://".to_string(),
        };

        Self {
            config: BackendConfig::Memory { key },
            object_store,
            canonical_url,
        }
    }
}
