//! At-least-once transport between the reader and the merge writers.
//!
//! A message body is the JSON array of one page's target records. A
//! delivered message stays in flight until it is acked; a nacked message
//! is redelivered until its receive count reaches the configured maximum
//! and is then dead-lettered.

mod governor;
mod memory;

pub use governor::BackpressureGovernor;
pub use memory::MemoryQueue;

use async_trait::async_trait;
use snafu::prelude::*;
use uuid::Uuid;

use crate::error::{MessageDecodeSnafu, MessageEncodeSnafu, QueueError};
use crate::metrics::events::FailureStage;
use crate::record::TargetRecord;

/// A received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Stable id of the message across redeliveries.
    pub message_id: Uuid,
    /// Handle for this delivery; valid until acked or nacked.
    pub receipt: Uuid,
    pub body: String,
    /// Number of times the message has been delivered, including this one.
    pub receive_count: u32,
}

impl Delivery {
    /// Decode the body into the batch it carries.
    pub fn decode(&self) -> Result<Vec<TargetRecord>, QueueError> {
        serde_json::from_str(&self.body).context(MessageDecodeSnafu {
            message_id: self.message_id.to_string(),
        })
    }
}

/// Encode a batch as a message body.
pub fn encode_batch(batch: &[TargetRecord]) -> Result<String, QueueError> {
    serde_json::to_string(batch).context(MessageEncodeSnafu)
}

#[async_trait]
pub trait PendingWriteQueue: Send + Sync {
    /// Enqueue one batch. Returns the message id.
    async fn send(&self, batch: &[TargetRecord]) -> Result<Uuid, QueueError>;

    /// Wait for the next message. `None` once the queue is closed and drained
    /// of visible messages.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge a delivery, removing the message for good.
    async fn ack(&self, receipt: Uuid) -> Result<(), QueueError>;

    /// Report a failed delivery. The message is redelivered or dead-lettered.
    async fn nack(&self, receipt: Uuid, error: &str, stage: FailureStage)
    -> Result<(), QueueError>;

    /// Messages waiting plus messages in flight.
    async fn approximate_depth(&self) -> Result<u64, QueueError>;

    /// Stop accepting sends and wake idle receivers.
    async fn close(&self);
}
