//! In-process event broker
//!
//! Single-node implementation of the bus contract. Each (topic, group)
//! subscription owns `partitions` bounded mpsc channels with one worker
//! task per partition: messages with the same key always land in the
//! same partition and are handled by a single task at a time, which is
//! what preserves per-key order. Bounded channels give backpressure;
//! a slow consumer blocks its producers instead of buffering unboundedly.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use rustc_hash::FxHasher;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{BusError, ConsumeError, Envelope, EventBus, EventHandler};
use crate::events::Topic;

/// Broker tuning knobs
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Partitions per (topic, group) subscription.
    pub partitions: usize,
    /// Per-partition channel capacity.
    pub buffer: usize,
    /// Delivery attempts before a message is parked in the DLQ.
    pub max_attempts: u32,
    /// First redelivery backoff; doubles per attempt.
    pub base_backoff: Duration,
    /// Backoff cap.
    pub max_backoff: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            partitions: 16,
            buffer: 1024,
            max_attempts: 10,
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// A message that exhausted its delivery attempts
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub topic: Topic,
    pub group: String,
    pub key: String,
    pub payload: String,
    pub attempts: u32,
    pub reason: String,
}

struct Subscription {
    group: String,
    senders: Vec<mpsc::Sender<Envelope>>,
}

/// In-process broker with consumer groups and a DLQ
pub struct MemoryBus {
    config: BusConfig,
    subscriptions: DashMap<Topic, Vec<Subscription>>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl MemoryBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            subscriptions: DashMap::new(),
            dead_letters: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BusConfig::default())
    }

    /// Register a consumer group on a topic and start its partition
    /// workers. Subscribe every group before traffic flows; messages
    /// published to a topic with no matching group are dropped with a
    /// warning.
    pub fn subscribe(&self, topic: Topic, group: &str, handler: Arc<dyn EventHandler>) {
        let mut senders = Vec::with_capacity(self.config.partitions);

        for partition in 0..self.config.partitions {
            let (tx, rx) = mpsc::channel(self.config.buffer);
            senders.push(tx);

            let worker = PartitionWorker {
                topic,
                group: group.to_string(),
                partition,
                handler: handler.clone(),
                config: self.config.clone(),
                dead_letters: self.dead_letters.clone(),
            };
            tokio::spawn(worker.run(rx));
        }

        self.subscriptions
            .entry(topic)
            .or_default()
            .push(Subscription {
                group: group.to_string(),
                senders,
            });
        debug!(topic = %topic, group, partitions = self.config.partitions, "Consumer group subscribed");
    }

    /// Messages parked so far, across all groups. Ops/test surface.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().unwrap().clone()
    }

    fn partition_for(&self, key: &str) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.config.partitions
    }
}

#[async_trait::async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, topic: Topic, key: &str, payload: String) -> Result<(), BusError> {
        let partition = self.partition_for(key);

        // Collect senders before awaiting; DashMap shard locks must not
        // be held across suspension points.
        let targets: Vec<(String, mpsc::Sender<Envelope>)> = match self.subscriptions.get(&topic) {
            Some(subs) => subs
                .iter()
                .map(|s| (s.group.clone(), s.senders[partition].clone()))
                .collect(),
            None => Vec::new(),
        };

        if targets.is_empty() {
            warn!(topic = %topic, key, "Publish with no consumer groups; message dropped");
            return Ok(());
        }

        let envelope = Envelope {
            topic,
            key: key.to_string(),
            payload,
        };

        for (group, sender) in targets {
            sender
                .send(envelope.clone())
                .await
                .map_err(|_| BusError::Unavailable(format!("{}/{} channel closed", topic, group)))?;
        }
        Ok(())
    }
}

struct PartitionWorker {
    topic: Topic,
    group: String,
    partition: usize,
    handler: Arc<dyn EventHandler>,
    config: BusConfig,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl PartitionWorker {
    async fn run(self, mut rx: mpsc::Receiver<Envelope>) {
        while let Some(envelope) = rx.recv().await {
            self.deliver(envelope).await;
        }
        debug!(
            topic = %self.topic,
            group = %self.group,
            partition = self.partition,
            "Partition worker stopped"
        );
    }

    /// Deliver one message: retry transient failures with exponential
    /// backoff, park fatal or exhausted messages, then move on so one
    /// poison message never blocks the partition.
    async fn deliver(&self, envelope: Envelope) {
        let mut attempt: u32 = 1;

        loop {
            match self.handler.handle(&envelope).await {
                Ok(()) => return,
                Err(ConsumeError::Fatal(reason)) => {
                    error!(
                        topic = %self.topic,
                        group = %self.group,
                        key = %envelope.key,
                        reason = %reason,
                        "Fatal consume error; parking message"
                    );
                    self.park(envelope, attempt, reason);
                    return;
                }
                Err(ConsumeError::Transient(reason)) => {
                    if attempt >= self.config.max_attempts {
                        error!(
                            topic = %self.topic,
                            group = %self.group,
                            key = %envelope.key,
                            attempts = attempt,
                            reason = %reason,
                            "Delivery attempts exhausted; parking message"
                        );
                        self.park(envelope, attempt, reason);
                        return;
                    }

                    let backoff = self
                        .config
                        .base_backoff
                        .saturating_mul(1 << (attempt - 1).min(16))
                        .min(self.config.max_backoff);
                    debug!(
                        topic = %self.topic,
                        group = %self.group,
                        key = %envelope.key,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        reason = %reason,
                        "Transient consume error; redelivering"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    fn park(&self, envelope: Envelope, attempts: u32, reason: String) {
        self.dead_letters.lock().unwrap().push(DeadLetter {
            topic: envelope.topic,
            group: self.group.clone(),
            key: envelope.key,
            payload: envelope.payload,
            attempts,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        seen: Mutex<Vec<String>>,
        calls: AtomicUsize,
        fail_with: Option<ConsumeError>,
    }

    impl Recorder {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                fail_with: None,
            })
        }

        fn failing(err: ConsumeError) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                fail_with: Some(err),
            })
        }
    }

    #[async_trait::async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, envelope: &Envelope) -> Result<(), ConsumeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => {
                    self.seen.lock().unwrap().push(envelope.payload.clone());
                    Ok(())
                }
            }
        }
    }

    fn quick_config() -> BusConfig {
        BusConfig {
            partitions: 4,
            buffer: 64,
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_same_key_preserves_order() {
        let bus = MemoryBus::new(quick_config());
        let recorder = Recorder::ok();
        bus.subscribe(Topic::BookingCreated, "g", recorder.clone());

        for i in 0..50 {
            bus.publish(Topic::BookingCreated, "42", format!("m{}", i))
                .await
                .unwrap();
        }
        settle().await;

        let seen = recorder.seen.lock().unwrap().clone();
        let expected: Vec<String> = (0..50).map(|i| format!("m{}", i)).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_every_group_receives_a_copy() {
        let bus = MemoryBus::new(quick_config());
        let saga = Recorder::ok();
        let notify = Recorder::ok();
        bus.subscribe(Topic::PaymentSuccess, "booking-saga", saga.clone());
        bus.subscribe(Topic::PaymentSuccess, "notification", notify.clone());

        bus.publish(Topic::PaymentSuccess, "7", "payload".to_string())
            .await
            .unwrap();
        settle().await;

        assert_eq!(saga.seen.lock().unwrap().len(), 1);
        assert_eq!(notify.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_redelivers_then_parks() {
        let bus = MemoryBus::new(quick_config());
        let recorder = Recorder::failing(ConsumeError::Transient("not yet".to_string()));
        bus.subscribe(Topic::PaymentSuccess, "g", recorder.clone());

        bus.publish(Topic::PaymentSuccess, "1", "p".to_string())
            .await
            .unwrap();
        settle().await;

        assert_eq!(recorder.calls.load(Ordering::SeqCst), 3);
        let parked = bus.dead_letters();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_fatal_failure_parks_without_blocking_partition() {
        let bus = MemoryBus::new(quick_config());
        let recorder = Recorder::failing(ConsumeError::Fatal("bad payload".to_string()));
        let follower = Recorder::ok();
        bus.subscribe(Topic::BookingCreated, "g", recorder.clone());
        bus.subscribe(Topic::BookingCreated, "g2", follower.clone());

        bus.publish(Topic::BookingCreated, "1", "poison".to_string())
            .await
            .unwrap();
        bus.publish(Topic::BookingCreated, "1", "good".to_string())
            .await
            .unwrap();
        settle().await;

        // One attempt only for the fatal group, partition not blocked.
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(bus.dead_letters().len(), 2);
        assert_eq!(follower.seen.lock().unwrap().len(), 2);
    }
}
