//! Retrying producer
//!
//! Wraps any [`EventBus`] with bounded exponential-backoff retries on
//! transport errors. Producers never buffer unboundedly; after the retry
//! budget the error surfaces to the caller, whose durable state (outbox
//! row, PENDING booking) is the recovery point.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use super::{BusError, EventBus};
use crate::events::Topic;

/// Default publish retry budget.
pub const DEFAULT_PUBLISH_RETRIES: u32 = 5;

/// Publisher with bounded retry
#[derive(Clone)]
pub struct RetryingPublisher {
    bus: Arc<dyn EventBus>,
    retries: u32,
    base_backoff: Duration,
}

impl RetryingPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self::with_retries(bus, DEFAULT_PUBLISH_RETRIES, Duration::from_millis(100))
    }

    pub fn with_retries(bus: Arc<dyn EventBus>, retries: u32, base_backoff: Duration) -> Self {
        Self {
            bus,
            retries,
            base_backoff,
        }
    }

    /// Serialise `payload` and publish it under `key`, retrying transport
    /// errors with exponential backoff.
    pub async fn publish_json<T: Serialize>(
        &self,
        topic: Topic,
        key: &str,
        payload: &T,
    ) -> Result<(), BusError> {
        let body = serde_json::to_string(payload).map_err(|e| BusError::Encode(e.to_string()))?;
        self.publish_raw(topic, key, body).await
    }

    /// Publish an already-encoded payload with the same retry policy.
    pub async fn publish_raw(
        &self,
        topic: Topic,
        key: &str,
        body: String,
    ) -> Result<(), BusError> {
        let mut attempt: u32 = 0;

        loop {
            match self.bus.publish(topic, key, body.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.retries => {
                    let backoff = self.base_backoff.saturating_mul(1 << attempt.min(16));
                    warn!(
                        topic = %topic,
                        key,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Publish failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyBus {
        failures_left: AtomicUsize,
        published: Mutex<Vec<(Topic, String, String)>>,
    }

    impl FlakyBus {
        fn failing(n: usize) -> Arc<Self> {
            Arc::new(Self {
                failures_left: AtomicUsize::new(n),
                published: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EventBus for FlakyBus {
        async fn publish(&self, topic: Topic, key: &str, payload: String) -> Result<(), BusError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BusError::Unavailable("broker down".to_string()));
            }
            self.published
                .lock()
                .unwrap()
                .push((topic, key.to_string(), payload));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_retries_through_transient_outage() {
        let bus = FlakyBus::failing(3);
        let publisher =
            RetryingPublisher::with_retries(bus.clone(), 5, Duration::from_millis(1));

        publisher
            .publish_json(Topic::BookingCreated, "1", &serde_json::json!({"ok": true}))
            .await
            .unwrap();

        assert_eq!(bus.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let bus = FlakyBus::failing(100);
        let publisher =
            RetryingPublisher::with_retries(bus.clone(), 2, Duration::from_millis(1));

        let result = publisher
            .publish_json(Topic::BookingCreated, "1", &serde_json::json!({}))
            .await;

        assert!(matches!(result, Err(BusError::Unavailable(_))));
        assert!(bus.published.lock().unwrap().is_empty());
    }
}
