//! Tatkal inventory (FCFS mode)
//!
//! First-come-first-served reservation against a single atomic counter
//! per event. The hot path is one atomic decrement; a CAS loop would
//! serialise contenders, so oversubscribed decrements compensate with an
//! increment instead. The compensation is not atomic with the decrement:
//! a transient reader may observe a negative stored value, which is why
//! every externally visible read clamps to zero.

use std::sync::Arc;

use tracing::{debug, info};

use super::keys;
use crate::core_types::EventId;
use crate::kvstore::{KvStore, StoreError};

/// `remaining()` result for an event with no initialised counter.
pub const UNINITIALISED: i64 = -1;

/// Atomic FCFS seat counter
pub struct TatkalInventory {
    store: Arc<dyn KvStore>,
}

impl TatkalInventory {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Set the counter to `total_seats`, overwriting any previous value.
    pub async fn initialize(&self, event_id: EventId, total_seats: u32) -> Result<(), StoreError> {
        let key = keys::inventory_key(event_id);
        self.store.set(&key, &total_seats.to_string(), None).await?;
        info!(event_id, total_seats, "Tatkal inventory initialised");
        Ok(())
    }

    /// Try to reserve one seat.
    ///
    /// The reservation decision uses the raw post-decrement value: `>= 0`
    /// succeeds, `< 0` lost the race past zero and is compensated.
    pub async fn try_reserve(&self, event_id: EventId) -> Result<bool, StoreError> {
        let key = keys::inventory_key(event_id);

        let post = self.store.decr(&key).await?;
        if post >= 0 {
            return Ok(true);
        }

        // Crossed zero: roll the overshoot back.
        self.store.incr(&key).await?;
        debug!(event_id, "Tatkal reserve lost the race (sold out)");
        Ok(false)
    }

    /// Return one seat to the pool (downstream payment or confirmation
    /// failed).
    pub async fn release(&self, event_id: EventId) -> Result<i64, StoreError> {
        let key = keys::inventory_key(event_id);
        self.store.incr(&key).await
    }

    /// Remaining seats, clamped to `>= 0` for display.
    /// [`UNINITIALISED`] when no counter exists for the event.
    pub async fn remaining(&self, event_id: EventId) -> Result<i64, StoreError> {
        let key = keys::inventory_key(event_id);
        match self.store.get(&key).await? {
            Some(raw) => {
                let stored: i64 = raw
                    .parse()
                    .map_err(|_| StoreError::NotAnInteger(key.clone()))?;
                Ok(stored.max(0))
            }
            None => Ok(UNINITIALISED),
        }
    }

    /// True when nothing is left to sell (an uninitialised event counts
    /// as sold out).
    pub async fn is_sold_out(&self, event_id: EventId) -> Result<bool, StoreError> {
        Ok(self.remaining(event_id).await? <= 0)
    }

    pub async fn delete(&self, event_id: EventId) -> Result<bool, StoreError> {
        self.store.delete(&keys::inventory_key(event_id)).await
    }

    /// Reset the counter; equivalent to `initialize`.
    pub async fn reset(&self, event_id: EventId, total_seats: u32) -> Result<(), StoreError> {
        self.initialize(event_id, total_seats).await
    }
}
