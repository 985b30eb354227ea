//! Lock Store primitive
//!
//! A small named-lock / atomic-counter primitive over opaque string keys.
//! The reservation engine is written against the [`KvStore`] trait only, so
//! the backing store is an injected capability: in-memory for tests and
//! single-node deployments, a remote key-value store in production.
//!
//! # Contract
//!
//! All operations are linearizable **per key**. Cross-key operations are
//! not atomic. A crash must not leak locks indefinitely; TTL is the
//! safety net.

pub mod memory;

pub use memory::MemoryKvStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// `ttl()` result for a key that exists but carries no TTL.
pub const TTL_NONE: i64 = -1;
/// `ttl()` result for a key with no live entry.
pub const TTL_MISSING: i64 = -2;

/// Lock store error types
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Value at key {0} is not an integer")]
    NotAnInteger(String),
}

/// Key-value primitive with per-key linearizability
///
/// Absence of a key is semantically equivalent to "unlocked"; an entry
/// whose TTL has elapsed is absent for every operation below.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Unconditionally store `value` under `key`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Atomically store `value` only if `key` has no live entry.
    /// Returns whether the store occurred.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Read the live value under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Refresh the TTL of a live entry. No effect (returns false) if absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remove `key`. Returns whether anything was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically remove `key` only when its current value equals `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Atomic integer increment; absent keys count from 0.
    /// Returns the post-operation value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Atomic integer decrement; absent keys count from 0.
    /// Returns the post-operation value (may be negative; callers handle
    /// rollback).
    async fn decr(&self, key: &str) -> Result<i64, StoreError>;

    /// Enumerate live keys with the given prefix. Possibly non-atomic.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Remaining TTL in seconds, [`TTL_NONE`] for no TTL, [`TTL_MISSING`]
    /// for no live entry.
    async fn ttl(&self, key: &str) -> Result<i64, StoreError>;
}
