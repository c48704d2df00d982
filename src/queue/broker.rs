//! Broker contract shared by the dispatcher and the worker pool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Queue topics. One per operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    /// Wallet creation, transfers and history scans.
    #[serde(rename = "wallet.operations")]
    WalletOperations,
    /// Every other chain read.
    #[serde(rename = "web3.operations")]
    ChainReads,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::WalletOperations, Topic::ChainReads];

    pub fn name(self) -> &'static str {
        match self {
            Topic::WalletOperations => "wallet.operations",
            Topic::ChainReads => "web3.operations",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from publishing or settling messages.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("queue {topic} is full ({max_length} messages)")]
    Full { topic: Topic, max_length: usize },

    #[error("queue {0} is closed")]
    Closed(Topic),

    #[error("queue persistence failed: {0}")]
    Persistence(String),
}

impl QueueError {
    pub fn reason(&self) -> &'static str {
        match self {
            QueueError::Full { .. } => "full",
            QueueError::Closed(_) => "closed",
            QueueError::Persistence(_) => "persistence",
        }
    }
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Processed; remove permanently.
    Ack,
    /// Unprocessable; remove permanently without redelivery.
    Reject,
    /// Not processed; put back at the head of the topic.
    Requeue,
}

/// Callback the broker attaches to each delivery.
pub trait Settle: Send + Sync {
    fn settle(&self, settlement: Settlement) -> Result<(), QueueError>;
}

/// A message handed to exactly one consumer.
///
/// Dropping a delivery without settling it requeues the message, so a
/// worker that panics mid-operation never loses it.
pub struct Delivery {
    pub topic: Topic,
    pub key: String,
    pub payload: Vec<u8>,
    /// True when this message was delivered before (requeue or journal replay).
    pub redelivered: bool,
    settle: Option<Box<dyn Settle>>,
}

impl Delivery {
    pub fn new(
        topic: Topic,
        key: String,
        payload: Vec<u8>,
        redelivered: bool,
        settle: Box<dyn Settle>,
    ) -> Self {
        Self {
            topic,
            key,
            payload,
            redelivered,
            settle: Some(settle),
        }
    }

    pub fn ack(mut self) -> Result<(), QueueError> {
        self.finish(Settlement::Ack)
    }

    pub fn reject(mut self) -> Result<(), QueueError> {
        self.finish(Settlement::Reject)
    }

    pub fn requeue(mut self) -> Result<(), QueueError> {
        self.finish(Settlement::Requeue)
    }

    fn finish(&mut self, settlement: Settlement) -> Result<(), QueueError> {
        match self.settle.take() {
            Some(settle) => settle.settle(settlement),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("topic", &self.topic)
            .field("key", &self.key)
            .field("payload_len", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.settle.is_some() {
            tracing::warn!(topic = %self.topic, key = %self.key, "Delivery dropped unsettled, requeueing");
            if let Err(e) = self.finish(Settlement::Requeue) {
                tracing::error!(topic = %self.topic, key = %self.key, error = %e, "Failed to requeue delivery");
            }
        }
    }
}

/// Durable at-least-once message queue.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Store a message. With a journal, `Ok` means the publish record was written.
    async fn publish(&self, topic: Topic, key: &str, payload: Vec<u8>) -> Result<(), QueueError>;

    /// Wait for the next message. `None` once the broker is closed.
    async fn receive(&self, topic: Topic) -> Option<Delivery>;

    /// Remove a message that has not been delivered yet.
    ///
    /// Returns `false` when no queued message carries `key`.
    async fn cancel(&self, topic: Topic, key: &str) -> Result<bool, QueueError>;

    /// Messages waiting for a consumer.
    fn depth(&self, topic: Topic) -> usize;

    /// Messages delivered but not yet settled.
    fn in_flight(&self, topic: Topic) -> usize;

    /// Stop accepting publishes and wake every waiting consumer.
    fn close(&self);
}
