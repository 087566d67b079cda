//! Dead-letter queue.
//!
//! Messages that keep failing in the writer pool are written as NDJSON to a
//! configurable storage location for manual reprocessing.

mod queue;
mod types;

pub use queue::DeadLetterQueue;
pub use types::{DeadLetter, FailureStats};
