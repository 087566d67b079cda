//! JSON snapshots of a [`MemoryTable`](super::MemoryTable).
//!
//! A snapshot lets the in-process table outlive a run: it is loaded before
//! the first step and saved after the last one.

use object_store::path::Path;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tracing::{debug, info};

use crate::error::{SnapshotCodecSnafu, SnapshotStorageSnafu, TableError};
use crate::record::{MetaRecord, TargetRecord};
use crate::storage::StorageProvider;

/// Object name of the snapshot inside its storage location.
pub const SNAPSHOT_FILE: &str = "table.json";

/// Serialized table contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub records: Vec<TargetRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaRecord>,
}

/// Load the snapshot stored at `storage`. A missing snapshot loads as empty.
pub async fn load_snapshot(storage: &StorageProvider) -> Result<TableSnapshot, TableError> {
    let bytes = match storage.get(&Path::from(SNAPSHOT_FILE)).await {
        Ok(bytes) => bytes,
        Err(e) if e.is_not_found() => {
            debug!(location = storage.canonical_url(), "No table snapshot, starting empty");
            return Ok(TableSnapshot::default());
        }
        Err(source) => return Err(TableError::SnapshotStorage { source }),
    };

    let snapshot: TableSnapshot = serde_json::from_slice(&bytes).context(SnapshotCodecSnafu)?;
    info!(
        location = storage.canonical_url(),
        records = snapshot.records.len(),
        "Loaded table snapshot"
    );
    Ok(snapshot)
}

/// Write `snapshot` to `storage`, replacing the previous one.
pub async fn save_snapshot(
    storage: &StorageProvider,
    snapshot: &TableSnapshot,
) -> Result<(), TableError> {
    let bytes = serde_json::to_vec(snapshot).context(SnapshotCodecSnafu)?;
    storage
        .put(&Path::from(SNAPSHOT_FILE), bytes)
        .await
        .context(SnapshotStorageSnafu)?;
    info!(
        location = storage.canonical_url(),
        records = snapshot.records.len(),
        "Saved table snapshot"
    );
    Ok(())
}
