//! snowdrift: incremental document-store to key-value table sync.
//!
//! Copies every collection of a source document store into a single
//! partitioned table, merging updates idempotently, and infers a typed
//! pseudo-schema for each collection ("facet") from what was written.
//!
//! # Example
//!
//! ```ignore
//! use snowdrift::{Config, run_sync, error::PipelineError};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("config.yaml")?;
//!     let stats = run_sync(config, CancellationToken::new()).await?;
//!     println!("Read {} documents", stats.run.documents_read);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod dlq;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod record;
pub mod schema;
pub mod signal;
pub mod source;
pub mod storage;
pub mod table;
pub mod tracing;
pub mod value;

pub use config::Config;
pub use context::SyncContext;
pub use pipeline::{SyncStats, run_sync, run_with_context};
pub use record::{MetaRecord, RecordKey, TargetRecord};
pub use storage::{StorageProvider, StorageProviderRef};
pub use value::{Fields, Value};
