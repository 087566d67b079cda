//! Shared collaborators for one sync run.

use std::sync::Arc;

use crate::queue::PendingWriteQueue;
use crate::source::SourceStore;
use crate::table::TargetTable;

/// Source store, target table and queue, built once at process start and
/// handed to every component that needs them.
#[derive(Clone)]
pub struct SyncContext {
    pub source: Arc<dyn SourceStore>,
    pub table: Arc<dyn TargetTable>,
    pub queue: Arc<dyn PendingWriteQueue>,
}

impl SyncContext {
    pub fn new(
        source: Arc<dyn SourceStore>,
        table: Arc<dyn TargetTable>,
        queue: Arc<dyn PendingWriteQueue>,
    ) -> Self {
        Self {
            source,
            table,
            queue,
        }
    }
}
