//! Transactional outbox
//!
//! Durable publication for the Postgres deployment: producers write
//! event rows next to their business state and a drainer task replays
//! them onto the bus in insertion order, marking each row once the
//! publish is acknowledged. A crash between a state transition and its
//! publish is recovered on the next drain, giving effectively-once
//! publication without distributed transactions (consumers are
//! idempotent, so the redelivery side is already paid for).
//!
//! [`PgOutbox`] implements [`EventBus`], so engines wired for the
//! durable path publish through the outbox without knowing it.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error, info, warn};

use crate::bus::{BusError, EventBus, RetryingPublisher};
use crate::events::Topic;

/// One undrained outbox row
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: i64,
    pub topic: Topic,
    pub partition_key: String,
    pub payload: String,
}

/// PostgreSQL-backed outbox
pub struct PgOutbox {
    pool: PgPool,
}

impl PgOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Unpublished rows in insertion order.
    pub async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxRow>, BusError> {
        let rows = sqlx::query(
            r#"
            SELECT id, topic, partition_key, payload
            FROM outbox_tb
            WHERE published_at IS NULL
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BusError::Unavailable(e.to_string()))?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let topic_str: String = row.get("topic");
            let Ok(topic) = Topic::from_str(&topic_str) else {
                // Our own writer produced this; an unknown topic means
                // version skew. Surface loudly but do not block the queue.
                error!(id = row.get::<i64, _>("id"), topic = %topic_str, "Unknown outbox topic; skipping row");
                self.mark_published(row.get("id")).await?;
                continue;
            };
            result.push(OutboxRow {
                id: row.get("id"),
                topic,
                partition_key: row.get("partition_key"),
                payload: row.get("payload"),
            });
        }
        Ok(result)
    }

    pub async fn mark_published(&self, id: i64) -> Result<(), BusError> {
        sqlx::query("UPDATE outbox_tb SET published_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl EventBus for PgOutbox {
    /// "Publishing" to the outbox is an insert; the drainer does the
    /// real broker publish asynchronously.
    async fn publish(&self, topic: Topic, key: &str, payload: String) -> Result<(), BusError> {
        sqlx::query(
            r#"
            INSERT INTO outbox_tb (topic, partition_key, payload, created_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(topic.as_str())
        .bind(key)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| BusError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

/// Configuration for the outbox drainer
#[derive(Debug, Clone)]
pub struct OutboxDrainerConfig {
    /// How often to poll for unpublished rows
    pub drain_interval: Duration,
    /// Maximum rows per drain cycle
    pub batch_size: usize,
}

impl Default for OutboxDrainerConfig {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_secs(1),
            batch_size: 100,
        }
    }
}

/// Outbox → bus re-publisher
pub struct OutboxDrainer {
    outbox: Arc<PgOutbox>,
    publisher: RetryingPublisher,
    config: OutboxDrainerConfig,
}

impl OutboxDrainer {
    pub fn new(
        outbox: Arc<PgOutbox>,
        publisher: RetryingPublisher,
        config: OutboxDrainerConfig,
    ) -> Self {
        Self {
            outbox,
            publisher,
            config,
        }
    }

    /// Run the drainer loop forever.
    pub async fn run(&self) -> ! {
        info!(
            drain_interval_ms = self.config.drain_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Starting outbox drainer"
        );

        loop {
            match self.drain_once().await {
                Ok(0) => {}
                Ok(count) => debug!(count, "Drained outbox rows"),
                Err(e) => error!(error = %e, "Outbox drain failed"),
            }
            tokio::time::sleep(self.config.drain_interval).await;
        }
    }

    /// Drain one batch. Stops at the first row that will not publish so
    /// per-key order is preserved; that row leads the next cycle.
    pub async fn drain_once(&self) -> Result<usize, BusError> {
        let rows = self.outbox.fetch_unpublished(self.config.batch_size).await?;
        let mut drained = 0;

        for row in rows {
            if let Err(e) = self
                .publisher
                .publish_raw(row.topic, &row.partition_key, row.payload.clone())
                .await
            {
                warn!(
                    id = row.id,
                    topic = %row.topic,
                    error = %e,
                    "Outbox publish failed; will retry next drain"
                );
                return Err(e);
            }
            self.outbox.mark_published(row.id).await?;
            drained += 1;
        }

        Ok(drained)
    }
}
