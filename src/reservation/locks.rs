//! Per-seat locking (VISUAL mode)
//!
//! Distributed named locks over the lock store. Value under each key is
//! the owning user id; absence of the key means the seat is free.
//!
//! Re-entrancy: `try_lock` returning true for the current owner is
//! deliberate. Under at-least-once delivery the saga must tolerate
//! repeated lock attempts from the same user without observable failure.
//! It is not recursion counting; a single release clears the lock.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::keys;
use crate::core_types::{EventId, SeatId, UserId};
use crate::kvstore::{KvStore, StoreError};

/// Default seat lock TTL (10 minutes from acquisition or refresh).
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(600);

/// Seat lock service
pub struct SeatLockService {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl SeatLockService {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_ttl(store, DEFAULT_LOCK_TTL)
    }

    pub fn with_ttl(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Try to acquire the lock on one seat for `user_id`.
    ///
    /// Returns true when the caller now holds the lock, either because the
    /// seat was free or because the caller already owned it (TTL is
    /// refreshed in that case).
    pub async fn try_lock(
        &self,
        event_id: EventId,
        seat_id: &str,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let key = keys::seat_lock_key(event_id, seat_id);
        let value = user_id.to_string();

        if self.store.set_if_absent(&key, &value, Some(self.ttl)).await? {
            debug!(event_id, seat_id, user_id, "Seat locked");
            return Ok(true);
        }

        // Lost the race; if the current owner is us, refresh and succeed.
        match self.store.get(&key).await? {
            Some(owner) if owner == value => {
                self.store.expire(&key, self.ttl).await?;
                debug!(event_id, seat_id, user_id, "Seat lock refreshed (re-entrant)");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// All-or-nothing acquisition of several seats, in the given order.
    ///
    /// On any failure every lock acquired in this call is released and
    /// false is returned. Two users contending for overlapping sets may
    /// both fail (mutual abort); retries are the client's responsibility.
    pub async fn try_lock_many(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let mut acquired: Vec<&str> = Vec::with_capacity(seat_ids.len());

        for seat_id in seat_ids {
            if self.try_lock(event_id, seat_id, user_id).await? {
                acquired.push(seat_id);
                continue;
            }

            debug!(
                event_id,
                seat_id = seat_id.as_str(),
                user_id,
                rollback = acquired.len(),
                "Multi-lock failed, rolling back partial acquisition"
            );
            for held in acquired {
                // Owner-checked release; cannot touch someone else's lock.
                self.release(event_id, held, user_id).await?;
            }
            return Ok(false);
        }

        Ok(true)
    }

    /// Owner-checked release (compare-and-delete).
    pub async fn release(
        &self,
        event_id: EventId,
        seat_id: &str,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let key = keys::seat_lock_key(event_id, seat_id);
        let released = self
            .store
            .delete_if_equals(&key, &user_id.to_string())
            .await?;
        if released {
            debug!(event_id, seat_id, user_id, "Seat lock released");
        }
        Ok(released)
    }

    /// Release every seat in the set; seats not owned by `user_id` are
    /// silently skipped.
    pub async fn release_many(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        user_id: UserId,
    ) -> Result<(), StoreError> {
        for seat_id in seat_ids {
            if !self.release(event_id, seat_id, user_id).await? {
                warn!(
                    event_id,
                    seat_id = seat_id.as_str(),
                    user_id,
                    "Release skipped (not the owner or already free)"
                );
            }
        }
        Ok(())
    }

    pub async fn is_locked(&self, event_id: EventId, seat_id: &str) -> Result<bool, StoreError> {
        let key = keys::seat_lock_key(event_id, seat_id);
        Ok(self.store.get(&key).await?.is_some())
    }

    /// Current owner of a seat, if any.
    pub async fn owner(
        &self,
        event_id: EventId,
        seat_id: &str,
    ) -> Result<Option<UserId>, StoreError> {
        let key = keys::seat_lock_key(event_id, seat_id);
        Ok(self
            .store
            .get(&key)
            .await?
            .and_then(|v| v.parse::<UserId>().ok()))
    }

    /// Remaining lock TTL in seconds (see [`crate::kvstore::KvStore::ttl`]).
    pub async fn ttl(&self, event_id: EventId, seat_id: &str) -> Result<i64, StoreError> {
        let key = keys::seat_lock_key(event_id, seat_id);
        self.store.ttl(&key).await
    }

    /// Seats of one event currently locked. Scan-based; may be stale.
    pub async fn locked_seats_for_event(
        &self,
        event_id: EventId,
    ) -> Result<Vec<SeatId>, StoreError> {
        let keys_found = self.store.scan(&keys::seat_lock_prefix(event_id)).await?;
        let mut seats: Vec<SeatId> = keys_found
            .iter()
            .filter_map(|k| keys::seat_id_from_key(k, event_id))
            .map(str::to_string)
            .collect();
        seats.sort();
        Ok(seats)
    }

    /// True when every seat in the set is currently owned by `user_id`.
    ///
    /// An empty set verifies nothing and is rejected.
    pub async fn verify_ownership(
        &self,
        event_id: EventId,
        seat_ids: &[SeatId],
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        if seat_ids.is_empty() {
            return Ok(false);
        }
        for seat_id in seat_ids {
            if self.owner(event_id, seat_id).await? != Some(user_id) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvstore::MemoryKvStore;

    fn service() -> SeatLockService {
        SeatLockService::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn test_try_lock_second_user_rejected() {
        let locks = service();

        assert!(locks.try_lock(1, "A1", 100).await.unwrap());
        assert!(!locks.try_lock(1, "A1", 200).await.unwrap());
        assert_eq!(locks.owner(1, "A1").await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_try_lock_reentrant_same_user() {
        let locks = service();

        assert!(locks.try_lock(1, "A1", 100).await.unwrap());
        assert!(locks.try_lock(1, "A1", 100).await.unwrap());

        // Single release clears the lock; no recursion counting.
        assert!(locks.release(1, "A1", 100).await.unwrap());
        assert!(!locks.is_locked(1, "A1").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_requires_ownership() {
        let locks = service();

        assert!(locks.try_lock(1, "A1", 100).await.unwrap());
        assert!(!locks.release(1, "A1", 200).await.unwrap());
        assert!(locks.is_locked(1, "A1").await.unwrap());
    }

    #[tokio::test]
    async fn test_try_lock_many_rolls_back_on_conflict() {
        let locks = service();

        assert!(locks.try_lock(1, "A2", 999).await.unwrap());

        let seats = vec!["A1".to_string(), "A2".to_string(), "A3".to_string()];
        assert!(!locks.try_lock_many(1, &seats, 100).await.unwrap());

        // A1 was acquired then rolled back; A2 still belongs to 999.
        assert!(!locks.is_locked(1, "A1").await.unwrap());
        assert_eq!(locks.owner(1, "A2").await.unwrap(), Some(999));
        assert!(!locks.is_locked(1, "A3").await.unwrap());
    }

    #[tokio::test]
    async fn test_try_lock_many_all_acquired() {
        let locks = service();
        let seats = vec!["A1".to_string(), "A2".to_string()];

        assert!(locks.try_lock_many(1, &seats, 100).await.unwrap());
        assert!(locks.verify_ownership(1, &seats, 100).await.unwrap());
        assert!(!locks.verify_ownership(1, &seats, 200).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_ownership_empty_set_rejected() {
        let locks = service();
        assert!(!locks.verify_ownership(1, &[], 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_locked_seats_for_event() {
        let locks = service();

        locks.try_lock(1, "A1", 100).await.unwrap();
        locks.try_lock(1, "B7", 200).await.unwrap();
        locks.try_lock(2, "A1", 300).await.unwrap();

        let seats = locks.locked_seats_for_event(1).await.unwrap();
        assert_eq!(seats, vec!["A1".to_string(), "B7".to_string()]);
    }

    #[tokio::test]
    async fn test_lock_expires_and_is_reclaimable() {
        let store = Arc::new(MemoryKvStore::new());
        let locks = SeatLockService::with_ttl(store, Duration::from_millis(20));

        assert!(locks.try_lock(1, "A1", 100).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!locks.is_locked(1, "A1").await.unwrap());
        assert!(locks.try_lock(1, "A1", 200).await.unwrap());
    }
}
