//! In-process broker with optional journal durability.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, Notify};

use crate::config::QueueConfig;
use crate::observability::metrics;
use crate::queue::broker::{Broker, Delivery, QueueError, Settle, Settlement, Topic};
use crate::queue::journal::{Journal, Record, Recovered};

#[derive(Debug, Clone)]
struct Message {
    seq: u64,
    key: String,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct TopicState {
    ready: VecDeque<Message>,
    unacked: HashMap<u64, Message>,
    closed: bool,
}

struct TopicQueue {
    topic: Topic,
    /// Bound on ready messages; publishes beyond it are refused.
    max_length: usize,
    state: Mutex<TopicState>,
    notify: Notify,
}

impl TopicQueue {
    fn new(topic: Topic, max_length: usize) -> Self {
        Self {
            topic,
            max_length,
            state: Mutex::new(TopicState::default()),
            notify: Notify::new(),
        }
    }
}

struct Shared {
    wallet: TopicQueue,
    reads: TopicQueue,
    next_seq: AtomicU64,
    journal: Option<Mutex<Journal>>,
    /// Held across a publish's journal write, and by compaction, so a
    /// record is never written between a compaction's snapshot and rewrite.
    publishing: AsyncMutex<()>,
    /// Settle records tolerated before the journal is rewritten.
    compact_after: usize,
}

impl Shared {
    fn queue(&self, topic: Topic) -> &TopicQueue {
        match topic {
            Topic::WalletOperations => &self.wallet,
            Topic::ChainReads => &self.reads,
        }
    }

    fn journal(&self, record: &Record) -> Result<(), QueueError> {
        match &self.journal {
            Some(journal) => lock(journal)
                .append(record)
                .map_err(|e| QueueError::Persistence(e.to_string())),
            None => Ok(()),
        }
    }

    /// Rewrite the journal down to the messages still queued or in flight.
    ///
    /// Topic locks are taken before the journal lock, the same order settle
    /// uses.
    fn compact(&self) -> Result<Option<usize>, QueueError> {
        let Some(journal) = &self.journal else {
            return Ok(None);
        };
        let wallet = lock(&self.wallet.state);
        let reads = lock(&self.reads.state);
        let mut journal = lock(journal);
        if journal.settled_since_compaction() < self.compact_after {
            return Ok(None);
        }

        let mut live: Vec<Recovered> = [(Topic::WalletOperations, &wallet), (Topic::ChainReads, &reads)]
            .into_iter()
            .flat_map(|(topic, state)| {
                state
                    .ready
                    .iter()
                    .chain(state.unacked.values())
                    .map(move |m| Recovered {
                        topic,
                        seq: m.seq,
                        key: m.key.clone(),
                        payload: m.payload.clone(),
                    })
            })
            .collect();
        live.sort_by_key(|m| m.seq);

        journal
            .rewrite(&live)
            .map_err(|e| QueueError::Persistence(e.to_string()))?;
        Ok(Some(live.len()))
    }
}

// A poisoned lock only means another thread panicked mid-update of plain
// collections; the data is still structurally valid.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Take {
    Message(Delivery),
    Empty,
    Closed,
}

/// Bounded, journaled, at-least-once broker.
///
/// Each message is delivered to one consumer at a time. It stays in the
/// unacked set until settled; a dropped delivery goes back to the head of
/// its topic.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Non-durable broker, mostly for tests.
    pub fn in_memory(wallet_max_length: usize, chain_max_length: usize) -> Self {
        Self::build(wallet_max_length, chain_max_length, None, 0, Vec::new())
    }

    /// Broker configured from `[queues]`, replaying the journal if one is set.
    pub fn open(config: &QueueConfig) -> Result<Self, QueueError> {
        let Some(path) = &config.journal_path else {
            tracing::warn!("No queue journal configured; accepted operations will not survive a restart");
            return Ok(Self::in_memory(config.wallet_max_length, config.chain_max_length));
        };

        let (journal, recovered) =
            Journal::open(path, config.fsync).map_err(|e| QueueError::Persistence(e.to_string()))?;

        let recovered = recovered
            .into_iter()
            .map(|m| {
                (
                    m.topic,
                    Message {
                        seq: m.seq,
                        key: m.key,
                        payload: m.payload,
                        redelivered: true,
                    },
                )
            })
            .collect();

        Ok(Self::build(
            config.wallet_max_length,
            config.chain_max_length,
            Some(journal),
            config.compact_after_settled,
            recovered,
        ))
    }

    fn build(
        wallet_max_length: usize,
        chain_max_length: usize,
        journal: Option<Journal>,
        compact_after: usize,
        recovered: Vec<(Topic, Message)>,
    ) -> Self {
        let shared = Shared {
            wallet: TopicQueue::new(Topic::WalletOperations, wallet_max_length),
            reads: TopicQueue::new(Topic::ChainReads, chain_max_length),
            next_seq: AtomicU64::new(1),
            journal: journal.map(Mutex::new),
            publishing: AsyncMutex::new(()),
            compact_after,
        };

        let mut max_seq = 0;
        for (topic, message) in recovered {
            max_seq = max_seq.max(message.seq);
            lock(&shared.queue(topic).state).ready.push_back(message);
        }
        shared.next_seq.store(max_seq + 1, Ordering::SeqCst);

        for topic in Topic::ALL {
            let depth = lock(&shared.queue(topic).state).ready.len();
            if depth > 0 {
                tracing::info!(topic = %topic, depth, "Recovered queued operations from journal");
            }
            metrics::record_queue_depth(topic.name(), depth);
        }

        Self {
            shared: Arc::new(shared),
        }
    }

    /// Payloads waiting for a consumer, oldest first.
    pub fn queued_payloads(&self, topic: Topic) -> Vec<Vec<u8>> {
        lock(&self.shared.queue(topic).state)
            .ready
            .iter()
            .map(|m| m.payload.clone())
            .collect()
    }

    pub fn is_durable(&self) -> bool {
        self.shared.journal.is_some()
    }

    /// Compact the journal once enough settle records have piled up.
    ///
    /// Returns the number of live messages kept, or `None` when no
    /// compaction was due. File I/O runs on the blocking pool.
    pub async fn compact_journal(&self) -> Result<Option<usize>, QueueError> {
        if self.shared.journal.is_none() {
            return Ok(None);
        }
        let _publishing = self.shared.publishing.lock().await;
        let shared = self.shared.clone();
        let compacted = tokio::task::spawn_blocking(move || shared.compact())
            .await
            .map_err(|e| QueueError::Persistence(e.to_string()))??;

        if let Some(live) = compacted {
            metrics::record_journal_compaction();
            tracing::info!(live, "Queue journal compacted");
        }
        Ok(compacted)
    }

    fn try_take(&self, topic: Topic) -> Take {
        let queue = self.shared.queue(topic);
        let mut state = lock(&queue.state);
        if state.closed {
            return Take::Closed;
        }
        let Some(message) = state.ready.pop_front() else {
            return Take::Empty;
        };
        state.unacked.insert(message.seq, message.clone());
        metrics::record_queue_depth(topic.name(), state.ready.len());

        Take::Message(Delivery::new(
            topic,
            message.key,
            message.payload,
            message.redelivered,
            Box::new(MemorySettle {
                shared: self.shared.clone(),
                topic,
                seq: message.seq,
            }),
        ))
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: Topic, key: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        let queue = self.shared.queue(topic);
        // Publishes are serialized, so the capacity check below stays valid
        // until the message is pushed.
        let _publishing = self.shared.publishing.lock().await;
        {
            let state = lock(&queue.state);
            if state.closed {
                return Err(QueueError::Closed(topic));
            }
            if state.ready.len() >= queue.max_length {
                return Err(QueueError::Full {
                    topic,
                    max_length: queue.max_length,
                });
            }
        }

        let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);
        if self.shared.journal.is_some() {
            let shared = self.shared.clone();
            let record = Record::Publish {
                topic,
                seq,
                key: key.to_string(),
                payload: alloy::hex::encode(&payload),
            };
            tokio::task::spawn_blocking(move || shared.journal(&record))
                .await
                .map_err(|e| QueueError::Persistence(e.to_string()))??;
        }

        let depth = {
            let mut state = lock(&queue.state);
            state.ready.push_back(Message {
                seq,
                key: key.to_string(),
                payload,
                redelivered: false,
            });
            state.ready.len()
        };

        queue.notify.notify_one();
        metrics::record_queue_depth(topic.name(), depth);
        Ok(())
    }

    async fn receive(&self, topic: Topic) -> Option<Delivery> {
        let queue = self.shared.queue(topic);
        loop {
            // Register interest before checking so a publish in between is not missed.
            let notified = queue.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_take(topic) {
                Take::Message(delivery) => return Some(delivery),
                Take::Closed => return None,
                Take::Empty => notified.await,
            }
        }
    }

    async fn cancel(&self, topic: Topic, key: &str) -> Result<bool, QueueError> {
        let queue = self.shared.queue(topic);
        let mut state = lock(&queue.state);
        let Some(pos) = state.ready.iter().position(|m| m.key == key) else {
            return Ok(false);
        };
        let seq = state.ready[pos].seq;
        self.shared.journal(&Record::Settle { topic, seq })?;
        state.ready.remove(pos);
        metrics::record_queue_depth(topic.name(), state.ready.len());
        Ok(true)
    }

    fn depth(&self, topic: Topic) -> usize {
        lock(&self.shared.queue(topic).state).ready.len()
    }

    fn in_flight(&self, topic: Topic) -> usize {
        lock(&self.shared.queue(topic).state).unacked.len()
    }

    fn close(&self) {
        for topic in Topic::ALL {
            let queue = self.shared.queue(topic);
            lock(&queue.state).closed = true;
            queue.notify.notify_waiters();
        }
        tracing::info!("Broker closed");
    }
}

struct MemorySettle {
    shared: Arc<Shared>,
    topic: Topic,
    seq: u64,
}

impl Settle for MemorySettle {
    fn settle(&self, settlement: Settlement) -> Result<(), QueueError> {
        let queue = self.shared.queue(self.topic);
        let mut state = lock(&queue.state);
        let Some(mut message) = state.unacked.remove(&self.seq) else {
            return Ok(());
        };

        match settlement {
            Settlement::Ack | Settlement::Reject => self.shared.journal(&Record::Settle {
                topic: self.topic,
                seq: self.seq,
            }),
            Settlement::Requeue => {
                message.redelivered = true;
                state.ready.push_front(message);
                let depth = state.ready.len();
                drop(state);
                queue.notify.notify_one();
                metrics::record_queue_depth(queue.topic.name(), depth);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_receive_ack() {
        let broker = MemoryBroker::in_memory(10, 10);
        broker.publish(Topic::ChainReads, "k1", b"one".to_vec()).await.unwrap();
        assert_eq!(broker.depth(Topic::ChainReads), 1);

        let delivery = broker.receive(Topic::ChainReads).await.unwrap();
        assert_eq!(delivery.payload, b"one");
        assert!(!delivery.redelivered);
        assert_eq!(broker.depth(Topic::ChainReads), 0);
        assert_eq!(broker.in_flight(Topic::ChainReads), 1);

        delivery.ack().unwrap();
        assert_eq!(broker.in_flight(Topic::ChainReads), 0);
    }

    #[tokio::test]
    async fn test_topics_are_independent() {
        let broker = MemoryBroker::in_memory(1, 1);
        broker.publish(Topic::WalletOperations, "w", vec![]).await.unwrap();
        broker.publish(Topic::ChainReads, "r", vec![]).await.unwrap();
        assert_eq!(broker.depth(Topic::WalletOperations), 1);
        assert_eq!(broker.depth(Topic::ChainReads), 1);
    }

    #[tokio::test]
    async fn test_overflow_rejects_publish() {
        let broker = MemoryBroker::in_memory(2, 2);
        broker.publish(Topic::ChainReads, "a", vec![1]).await.unwrap();
        broker.publish(Topic::ChainReads, "b", vec![2]).await.unwrap();

        let err = broker.publish(Topic::ChainReads, "c", vec![3]).await.unwrap_err();
        assert!(matches!(err, QueueError::Full { max_length: 2, .. }));

        // Nothing already accepted was dropped
        let first = broker.receive(Topic::ChainReads).await.unwrap();
        let second = broker.receive(Topic::ChainReads).await.unwrap();
        assert_eq!((first.key.as_str(), second.key.as_str()), ("a", "b"));
        first.ack().unwrap();
        second.ack().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_delivery_is_redelivered_first() {
        let broker = MemoryBroker::in_memory(10, 10);
        broker.publish(Topic::ChainReads, "a", vec![]).await.unwrap();
        broker.publish(Topic::ChainReads, "b", vec![]).await.unwrap();

        drop(broker.receive(Topic::ChainReads).await.unwrap());

        let again = broker.receive(Topic::ChainReads).await.unwrap();
        assert_eq!(again.key, "a");
        assert!(again.redelivered);
        again.ack().unwrap();
    }

    #[tokio::test]
    async fn test_rejected_delivery_is_not_redelivered() {
        let broker = MemoryBroker::in_memory(10, 10);
        broker.publish(Topic::ChainReads, "bad", vec![]).await.unwrap();
        broker.receive(Topic::ChainReads).await.unwrap().reject().unwrap();

        assert_eq!(broker.depth(Topic::ChainReads), 0);
        assert_eq!(broker.in_flight(Topic::ChainReads), 0);
    }

    #[tokio::test]
    async fn test_receive_waits_for_publish() {
        let broker = MemoryBroker::in_memory(10, 10);
        let consumer = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.receive(Topic::WalletOperations).await.map(|d| d.key.clone()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.publish(Topic::WalletOperations, "late", vec![]).await.unwrap();

        assert_eq!(consumer.await.unwrap().as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_cancel_only_removes_queued() {
        let broker = MemoryBroker::in_memory(10, 10);
        broker.publish(Topic::ChainReads, "a", vec![]).await.unwrap();
        broker.publish(Topic::ChainReads, "b", vec![]).await.unwrap();

        let in_hand = broker.receive(Topic::ChainReads).await.unwrap();
        assert!(!broker.cancel(Topic::ChainReads, "a").await.unwrap());
        assert!(broker.cancel(Topic::ChainReads, "b").await.unwrap());
        assert_eq!(broker.depth(Topic::ChainReads), 0);
        in_hand.ack().unwrap();
    }

    #[tokio::test]
    async fn test_close_wakes_consumers_and_refuses_publish() {
        let broker = MemoryBroker::in_memory(10, 10);
        let consumer = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.receive(Topic::ChainReads).await.is_none() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        broker.close();
        assert!(consumer.await.unwrap());
        assert!(matches!(
            broker.publish(Topic::ChainReads, "x", vec![]).await,
            Err(QueueError::Closed(Topic::ChainReads))
        ));
    }

    #[tokio::test]
    async fn test_journal_redelivers_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = QueueConfig {
            journal_path: Some(dir.path().join("q.journal").display().to_string()),
            ..QueueConfig::default()
        };

        {
            let broker = MemoryBroker::open(&config).unwrap();
            broker.publish(Topic::ChainReads, "done", b"1".to_vec()).await.unwrap();
            broker.publish(Topic::ChainReads, "lost", b"2".to_vec()).await.unwrap();
            broker.receive(Topic::ChainReads).await.unwrap().ack().unwrap();
            // "lost" is in hand when the process dies
            let in_hand = broker.receive(Topic::ChainReads).await.unwrap();
            std::mem::forget(in_hand);
        }

        let broker = MemoryBroker::open(&config).unwrap();
        assert_eq!(broker.depth(Topic::ChainReads), 1);
        let delivery = broker.receive(Topic::ChainReads).await.unwrap();
        assert_eq!(delivery.key, "lost");
        assert_eq!(delivery.payload, b"2");
        assert!(delivery.redelivered);

        // New sequence numbers continue past recovered ones
        broker.publish(Topic::ChainReads, "next", vec![]).await.unwrap();
        delivery.ack().unwrap();
    }

    #[tokio::test]
    async fn test_queued_payloads_lists_ready_messages() {
        let broker = MemoryBroker::in_memory(10, 10);
        broker.publish(Topic::ChainReads, "a", b"first".to_vec()).await.unwrap();
        broker.publish(Topic::ChainReads, "b", b"second".to_vec()).await.unwrap();
        let in_hand = broker.receive(Topic::ChainReads).await.unwrap();

        assert_eq!(broker.queued_payloads(Topic::ChainReads), vec![b"second".to_vec()]);
        assert!(broker.queued_payloads(Topic::WalletOperations).is_empty());
        in_hand.ack().unwrap();
    }

    #[tokio::test]
    async fn test_journal_compacts_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.journal");
        let config = QueueConfig {
            journal_path: Some(path.display().to_string()),
            compact_after_settled: 2,
            ..QueueConfig::default()
        };

        let broker = MemoryBroker::open(&config).unwrap();
        assert!(broker.is_durable());
        for key in ["a", "b", "c", "d"] {
            broker.publish(Topic::ChainReads, key, key.as_bytes().to_vec()).await.unwrap();
        }
        broker.receive(Topic::ChainReads).await.unwrap().ack().unwrap();
        // One settle record is below the threshold
        assert_eq!(broker.compact_journal().await.unwrap(), None);

        broker.receive(Topic::ChainReads).await.unwrap().ack().unwrap();
        let in_hand = broker.receive(Topic::ChainReads).await.unwrap();
        assert_eq!(in_hand.key, "c");

        // "c" is in flight and "d" queued; both must survive
        assert_eq!(broker.compact_journal().await.unwrap(), Some(2));
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);

        // Appends after the rewrite land in the new file
        broker.publish(Topic::WalletOperations, "e", b"e".to_vec()).await.unwrap();
        std::mem::forget(in_hand);
        drop(broker);

        let reopened = MemoryBroker::open(&config).unwrap();
        assert_eq!(reopened.queued_payloads(Topic::ChainReads), vec![b"c".to_vec(), b"d".to_vec()]);
        assert_eq!(reopened.depth(Topic::WalletOperations), 1);
    }

    #[tokio::test]
    async fn test_broker_without_journal_never_compacts() {
        let broker = MemoryBroker::open(&QueueConfig::default()).unwrap();
        assert!(!broker.is_durable());
        assert_eq!(broker.compact_journal().await.unwrap(), None);
    }
}
