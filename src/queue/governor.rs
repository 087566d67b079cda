//! Backpressure governor.
//!
//! Decides whether the read loop may stop: only once nothing was read,
//! no collections remain and the pending-write queue is empty.

use std::sync::Arc;
use tracing::warn;

use super::PendingWriteQueue;
use crate::emit;
use crate::metrics::events::{DepthProbeFailed, QueueDepth};

#[derive(Clone)]
pub struct BackpressureGovernor {
    queue: Arc<dyn PendingWriteQueue>,
}

impl BackpressureGovernor {
    pub fn new(queue: Arc<dyn PendingWriteQueue>) -> Self {
        Self { queue }
    }

    /// Probe the queue depth. A failed probe reads as zero.
    pub async fn probe(&self) -> u64 {
        match self.queue.approximate_depth().await {
            Ok(depth) => {
                emit!(QueueDepth { depth });
                depth
            }
            Err(e) => {
                warn!(error = %e, "Queue depth probe failed, assuming empty");
                emit!(DepthProbeFailed);
                0
            }
        }
    }

    /// Whether the loop has to run another round.
    pub fn must_continue(read_documents: bool, collections_remaining: bool, depth: u64) -> bool {
        read_documents || collections_remaining || depth > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::metrics::events::FailureStage;
    use crate::queue::{Delivery, MemoryQueue};
    use crate::record::TargetRecord;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct BrokenQueue;

    #[async_trait]
    impl PendingWriteQueue for BrokenQueue {
        async fn send(&self, _batch: &[TargetRecord]) -> Result<Uuid, QueueError> {
            Ok(Uuid::new_v4())
        }
        async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
            Ok(None)
        }
        async fn ack(&self, _receipt: Uuid) -> Result<(), QueueError> {
            Ok(())
        }
        async fn nack(&self, _: Uuid, _: &str, _: FailureStage) -> Result<(), QueueError> {
            Ok(())
        }
        async fn approximate_depth(&self) -> Result<u64, QueueError> {
            Err(QueueError::DepthProbe {
                message: "throttled".to_string(),
            })
        }
        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_probe_fails_open() {
        let governor = BackpressureGovernor::new(Arc::new(BrokenQueue));
        assert_eq!(governor.probe().await, 0);
    }

    #[tokio::test]
    async fn test_probe_reports_depth() {
        let queue = Arc::new(MemoryQueue::new(3));
        queue.send(&[]).await.unwrap();
        queue.send(&[]).await.unwrap();

        let governor = BackpressureGovernor::new(queue);
        assert_eq!(governor.probe().await, 2);
    }

    #[test]
    fn test_must_continue() {
        assert!(!BackpressureGovernor::must_continue(false, false, 0));
        assert!(BackpressureGovernor::must_continue(true, false, 0));
        assert!(BackpressureGovernor::must_continue(false, true, 0));
        assert!(BackpressureGovernor::must_continue(false, false, 1));
    }
}
