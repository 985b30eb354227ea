//! In-memory lock store
//!
//! DashMap-backed [`KvStore`] implementation. Per-key linearizability
//! comes from DashMap's entry locking: every operation below holds the
//! key's shard lock for the whole read-modify-write.
//!
//! Expired entries are treated as absent on access and reclaimed either
//! lazily (next touch) or by [`MemoryKvStore::purge_expired`], which a
//! background task runs on an interval.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{KvStore, StoreError, TTL_MISSING, TTL_NONE};

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if at <= Instant::now())
    }
}

/// In-memory key-value store with TTL support
#[derive(Default)]
pub struct MemoryKvStore {
    map: DashMap<String, Slot>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Drop all expired entries. Returns how many were reclaimed.
    pub fn purge_expired(&self) -> usize {
        let before = self.map.len();
        self.map.retain(|_, slot| !slot.is_expired());
        before - self.map.len()
    }

    /// Number of live entries (expired-but-unreclaimed excluded).
    pub fn len(&self) -> usize {
        self.map.iter().filter(|e| !e.value().is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Slot::new(&delta.to_string(), None));
                    return Ok(delta);
                }
                let current: i64 = occupied
                    .get()
                    .value
                    .parse()
                    .map_err(|_| StoreError::NotAnInteger(key.to_string()))?;
                let next = current + delta;
                occupied.get_mut().value = next.to_string();
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(&delta.to_string(), None));
                Ok(delta)
            }
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.map.insert(key.to_string(), Slot::new(value, ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Slot::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.map.get(key) {
            Some(slot) if !slot.is_expired() => Ok(Some(slot.value.clone())),
            _ => Ok(None),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        match self.map.get_mut(key) {
            Some(mut slot) if !slot.is_expired() => {
                slot.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        match self.map.remove(key) {
            Some((_, slot)) => Ok(!slot.is_expired()),
            None => Ok(false),
        }
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        match self.map.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                if !occupied.get().is_expired() && occupied.get().value == expected {
                    occupied.remove();
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.incr_by(key, 1)
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        self.incr_by(key, -1)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .map
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        match self.map.get(key) {
            Some(slot) if !slot.is_expired() => match slot.expires_at {
                // Round up so a freshly set TTL reads back whole.
                Some(at) => Ok(at
                    .saturating_duration_since(Instant::now())
                    .as_millis()
                    .div_ceil(1000) as i64),
                None => Ok(TTL_NONE),
            },
            _ => Ok(TTL_MISSING),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_only_first_wins() {
        let store = MemoryKvStore::new();

        assert!(store.set_if_absent("k", "a", None).await.unwrap());
        assert!(!store.set_if_absent("k", "b", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let store = MemoryKvStore::new();

        store
            .set_if_absent("k", "a", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), TTL_MISSING);
        // A new owner can claim the expired key.
        assert!(store.set_if_absent("k", "b", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_if_equals() {
        let store = MemoryKvStore::new();
        store.set("k", "owner-1", None).await.unwrap();

        assert!(!store.delete_if_equals("k", "owner-2").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("owner-1"));

        assert!(store.delete_if_equals("k", "owner-1").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_decr_from_absent() {
        let store = MemoryKvStore::new();

        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        assert_eq!(store.decr("c").await.unwrap(), 1);
        // Decrement below zero is allowed; callers compensate.
        assert_eq!(store.decr("fresh").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_incr_non_integer_value() {
        let store = MemoryKvStore::new();
        store.set("k", "not-a-number", None).await.unwrap();

        assert!(matches!(
            store.incr("k").await,
            Err(StoreError::NotAnInteger(_))
        ));
    }

    #[tokio::test]
    async fn test_expire_refreshes_ttl() {
        let store = MemoryKvStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();

        assert!(store.expire("k", Duration::from_secs(600)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.ttl("k").await.unwrap() > 0);

        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_prefix_skips_expired() {
        let store = MemoryKvStore::new();
        store.set("lock:event:1:seat:A1", "u", None).await.unwrap();
        store
            .set("lock:event:1:seat:A2", "u", Some(Duration::from_millis(5)))
            .await
            .unwrap();
        store.set("inventory:event:1", "10", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        let keys = store.scan("lock:event:1:").await.unwrap();
        assert_eq!(keys, vec!["lock:event:1:seat:A1".to_string()]);
    }

    #[tokio::test]
    async fn test_purge_expired_reclaims() {
        let store = MemoryKvStore::new();
        store
            .set("a", "1", Some(Duration::from_millis(5)))
            .await
            .unwrap();
        store.set("b", "2", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_set_if_absent_single_winner() {
        use std::sync::Arc;

        let store = Arc::new(MemoryKvStore::new());
        let mut tasks = tokio::task::JoinSet::new();

        for i in 0..100u32 {
            let store = store.clone();
            tasks.spawn(async move {
                store
                    .set_if_absent("contended", &i.to_string(), None)
                    .await
                    .unwrap()
            });
        }

        let mut winners = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
