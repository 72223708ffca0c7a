//! Storage Collaborator Contract
//!
//! The engine does not own persistence. It consumes a key-value/document
//! store offering the primitives the consistency model needs:
//!
//! - atomic get/set with optional TTL
//! - uniqueness-constrained insert (the sole duplicate-vote guard)
//! - compare-and-set (the per-account balance serialization point)
//! - atomic increment (vote/view counters, never read-modify-write)
//! - an atomic sliding-window unit: prune + count + conditional insert +
//!   TTL refresh in one step (mirrors a pipelined ZREMRANGEBYSCORE /
//!   ZCARD / ZADD / PEXPIRE)
//! - an append-only per-key log for ledger entries
//!
//! [`MemoryStore`] is the in-process implementation used by tests and
//! single-node deployments; a networked store slots in behind the same
//! trait.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

/// Result of one atomic sliding-window operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSlide {
    /// Whether a marker was inserted (pre-insert count was below max).
    pub inserted: bool,
    /// Member count once the whole operation has completed.
    pub count: u32,
    /// Timestamp of the oldest surviving marker, if any.
    pub oldest_ms: Option<i64>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Insert iff the key does not exist. Returns false on conflict.
    async fn insert_unique(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Delete a key. Returns false if it did not exist.
    async fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically add `delta` to an integer key (created at 0), returning
    /// the new value. TTL is applied only when the key is created.
    async fn incr(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError>;

    /// Write `value` iff the current value equals `expected` (`None`
    /// meaning the key must be absent). Returns false when the
    /// comparison lost. A successful write replaces the key's TTL.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// One atomic sliding-window unit over the time-ordered member set at
    /// `key`: drop members last seen before `cutoff_ms`, count the rest,
    /// and insert `member` at `now_ms` iff `max` is `None` or the count
    /// is below it. Passing `max = Some(0)` makes this a pure
    /// prune-and-count. The structure's TTL is refreshed to `ttl`.
    async fn window_slide(
        &self,
        key: &str,
        cutoff_ms: i64,
        now_ms: i64,
        member: u64,
        max: Option<u32>,
        ttl: Duration,
    ) -> Result<WindowSlide, StoreError>;

    /// Append an entry to the log at `key`, returning its sequence number.
    async fn log_append(&self, key: &str, entry: Vec<u8>) -> Result<u64, StoreError>;

    /// Read the full log at `key` in append order.
    async fn log_scan(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError>;
}
