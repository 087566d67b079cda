//! In-process pending-write queue.

use async_trait::async_trait;
use chrono::Utc;
use snafu::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Delivery, PendingWriteQueue, encode_batch};
use crate::dlq::{DeadLetter, DeadLetterQueue};
use crate::emit;
use crate::error::{QueueClosedSnafu, QueueError, UnknownReceiptSnafu};
use crate::metrics::events::{FailureStage, MessageDeadLettered, MessageNacked};
use crate::record::TargetRecord;

#[derive(Debug)]
struct Message {
    id: Uuid,
    body: String,
    receive_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    in_flight: HashMap<Uuid, Message>,
    dead_letters: Vec<DeadLetter>,
    closed: bool,
}

/// A [`PendingWriteQueue`] held in memory.
///
/// Redelivers nacked messages at the back of the queue and dead-letters a
/// message once it has been received `max_receive_count` times. Dead
/// letters are kept in memory and, when a [`DeadLetterQueue`] is attached,
/// written to storage as well.
#[derive(Debug)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    max_receive_count: u32,
    dlq: Option<Arc<DeadLetterQueue>>,
}

impl MemoryQueue {
    pub fn new(max_receive_count: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            max_receive_count: max_receive_count.max(1),
            dlq: None,
        }
    }

    pub fn with_dlq(mut self, dlq: Arc<DeadLetterQueue>) -> Self {
        self.dlq = Some(dlq);
        self
    }

    /// Enqueue a raw message body, such as a replayed dead letter.
    pub async fn send_body(&self, body: String) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        {
            let mut state = self.state.lock().await;
            ensure!(!state.closed, QueueClosedSnafu);
            state.ready.push_back(Message {
                id,
                body,
                receive_count: 0,
            });
        }
        self.notify.notify_waiters();
        Ok(id)
    }

    /// Messages dead-lettered so far.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.clone()
    }
}

#[async_trait]
impl PendingWriteQueue for MemoryQueue {
    async fn send(&self, batch: &[TargetRecord]) -> Result<Uuid, QueueError> {
        let body = encode_batch(batch)?;
        let id = self.send_body(body).await?;
        debug!(message_id = %id, records = batch.len(), "Message sent");
        Ok(id)
    }

    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        loop {
            // Registered before the state check so a send in between is not missed.
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(mut message) = state.ready.pop_front() {
                    message.receive_count += 1;
                    let delivery = Delivery {
                        message_id: message.id,
                        receipt: Uuid::new_v4(),
                        body: message.body.clone(),
                        receive_count: message.receive_count,
                    };
                    state.in_flight.insert(delivery.receipt, message);
                    return Ok(Some(delivery));
                }
                if state.closed && state.in_flight.is_empty() {
                    return Ok(None);
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, receipt: Uuid) -> Result<(), QueueError> {
        let removed = self.state.lock().await.in_flight.remove(&receipt);
        ensure!(
            removed.is_some(),
            UnknownReceiptSnafu {
                receipt: receipt.to_string()
            }
        );
        self.notify.notify_waiters();
        Ok(())
    }

    async fn nack(
        &self,
        receipt: Uuid,
        error: &str,
        stage: FailureStage,
    ) -> Result<(), QueueError> {
        let dead_letter = {
            let mut state = self.state.lock().await;
            let message = state
                .in_flight
                .remove(&receipt)
                .context(UnknownReceiptSnafu {
                    receipt: receipt.to_string(),
                })?;

            emit!(MessageNacked { stage });

            if message.receive_count >= self.max_receive_count {
                let letter = DeadLetter {
                    message_id: message.id.to_string(),
                    body: message.body,
                    error: error.to_string(),
                    stage,
                    receive_count: message.receive_count,
                    timestamp: Utc::now(),
                };
                state.dead_letters.push(letter.clone());
                Some(letter)
            } else {
                state.ready.push_back(message);
                None
            }
        };

        if let Some(letter) = dead_letter {
            warn!(
                message_id = %letter.message_id,
                receive_count = letter.receive_count,
                stage = stage.as_str(),
                error,
                "Message exhausted its deliveries, dead-lettering"
            );
            emit!(MessageDeadLettered { stage });
            if let Some(dlq) = &self.dlq {
                dlq.record(letter).await;
            }
        }

        self.notify.notify_waiters();
        Ok(())
    }

    async fn approximate_depth(&self) -> Result<u64, QueueError> {
        let state = self.state.lock().await;
        Ok((state.ready.len() + state.in_flight.len()) as u64)
    }

    async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }
}
