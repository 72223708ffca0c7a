//! In-Process Store
//!
//! DashMap-backed implementation of the [`Store`] contract. Each key maps
//! to one typed slot; the DashMap entry guard makes every operation on a
//! single key an atomic unit, which is exactly the guarantee the limiter
//! and ledger lean on. TTLs are enforced lazily on access, which is
//! sufficient for a single-process store.
//!
//! An outage can be simulated with [`MemoryStore::set_unavailable`]; every
//! operation then fails with `StoreError::Unavailable`, letting callers
//! exercise their fail-open/fail-closed policies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::error::StoreError;

use super::{Store, WindowSlide};

#[derive(Debug, Clone)]
enum Slot {
    Bytes(Vec<u8>),
    Counter(i64),
    /// member -> last-seen timestamp (ms). Mirrors a ZSET keyed by score.
    Window(HashMap<u64, i64>),
    Log(Vec<Vec<u8>>),
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn live(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map_or(true, |at| at > now_ms)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backing-store outage. All operations fail with
    /// `Unavailable` until cleared.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn check_up(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    fn expire_ms(ttl: Option<Duration>, now_ms: i64) -> Option<i64> {
        ttl.map(|t| now_ms + t.as_millis() as i64)
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::Corrupt {
            key: key.to_string(),
            detail: "slot holds a different value type".to_string(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_up()?;
        let now = Utc::now().timestamp_millis();
        match self.entries.get(key) {
            Some(entry) if entry.live(now) => match &entry.slot {
                Slot::Bytes(b) => Ok(Some(b.clone())),
                Slot::Counter(n) => Ok(Some(n.to_string().into_bytes())),
                _ => Err(Self::wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.check_up()?;
        let now = Utc::now().timestamp_millis();
        self.entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Bytes(value),
                expires_at_ms: Self::expire_ms(ttl, now),
            },
        );
        Ok(())
    }

    async fn insert_unique(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.check_up()?;
        let now = Utc::now().timestamp_millis();
        let mut inserted = false;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            inserted = true;
            Entry {
                slot: Slot::Bytes(value.clone()),
                expires_at_ms: Self::expire_ms(ttl, now),
            }
        });
        if !inserted && !entry.live(now) {
            // Expired slot counts as absent.
            *entry = Entry {
                slot: Slot::Bytes(value),
                expires_at_ms: Self::expire_ms(ttl, now),
            };
            inserted = true;
        }
        Ok(inserted)
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.check_up()?;
        let now = Utc::now().timestamp_millis();
        match self.entries.remove(key) {
            Some((_, entry)) => Ok(entry.live(now)),
            None => Ok(false),
        }
    }

    async fn incr(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError> {
        self.check_up()?;
        let now = Utc::now().timestamp_millis();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Counter(0),
            expires_at_ms: Self::expire_ms(ttl, now),
        });
        if !entry.live(now) {
            *entry = Entry {
                slot: Slot::Counter(0),
                expires_at_ms: Self::expire_ms(ttl, now),
            };
        }
        match &mut entry.slot {
            Slot::Counter(n) => {
                *n += delta;
                Ok(*n)
            }
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.check_up()?;
        let now = Utc::now().timestamp_millis();
        match self.entries.entry(key.to_string()) {
            dashmap::Entry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(false);
                }
                vacant.insert(Entry {
                    slot: Slot::Bytes(value),
                    expires_at_ms: Self::expire_ms(ttl, now),
                });
                Ok(true)
            }
            dashmap::Entry::Occupied(mut occupied) => {
                let matches = if occupied.get().live(now) {
                    match &occupied.get().slot {
                        Slot::Bytes(b) => expected == Some(b.as_slice()),
                        _ => return Err(Self::wrong_type(key)),
                    }
                } else {
                    expected.is_none()
                };
                if matches {
                    let entry = occupied.get_mut();
                    entry.slot = Slot::Bytes(value);
                    entry.expires_at_ms = Self::expire_ms(ttl, now);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn window_slide(
        &self,
        key: &str,
        cutoff_ms: i64,
        now_ms: i64,
        member: u64,
        max: Option<u32>,
        ttl: Duration,
    ) -> Result<WindowSlide, StoreError> {
        self.check_up()?;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Window(HashMap::new()),
            expires_at_ms: None,
        });
        if !entry.live(now_ms) {
            entry.slot = Slot::Window(HashMap::new());
        }
        entry.expires_at_ms = Some(now_ms + ttl.as_millis() as i64);
        match &mut entry.slot {
            Slot::Window(members) => {
                members.retain(|_, seen| *seen >= cutoff_ms);
                let before = members.len() as u32;
                let inserted = match max {
                    Some(limit) if before >= limit => false,
                    _ => {
                        members.insert(member, now_ms);
                        true
                    }
                };
                let oldest_ms = members.values().copied().min();
                Ok(WindowSlide {
                    inserted,
                    count: members.len() as u32,
                    oldest_ms,
                })
            }
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn log_append(&self, key: &str, value: Vec<u8>) -> Result<u64, StoreError> {
        self.check_up()?;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Log(Vec::new()),
            expires_at_ms: None,
        });
        match &mut entry.slot {
            Slot::Log(log) => {
                log.push(value);
                Ok(log.len() as u64 - 1)
            }
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn log_scan(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        self.check_up()?;
        match self.entries.get(key) {
            Some(entry) => match &entry.slot {
                Slot::Log(log) => Ok(log.clone()),
                _ => Err(Self::wrong_type(key)),
            },
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unique_insert_rejects_duplicate() {
        let store = MemoryStore::new();
        assert!(store.insert_unique("k", b"a".to_vec(), None).await.unwrap());
        assert!(!store.insert_unique("k", b"b".to_vec(), None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn test_incr_is_cumulative() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("n", 1, None).await.unwrap(), 1);
        assert_eq!(store.incr("n", 2, None).await.unwrap(), 3);
        assert_eq!(store.incr("n", -3, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_compare_and_set_versions() {
        let store = MemoryStore::new();
        assert!(store
            .compare_and_set("b", None, b"v1".to_vec(), None)
            .await
            .unwrap());
        // Stale expectation loses.
        assert!(!store
            .compare_and_set("b", None, b"v2".to_vec(), None)
            .await
            .unwrap());
        assert!(store
            .compare_and_set("b", Some(b"v1"), b"v2".to_vec(), None)
            .await
            .unwrap());
        assert_eq!(store.get("b").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_compare_and_set_against_deleted_key_loses() {
        let store = MemoryStore::new();
        store.set("k", b"v1".to_vec(), None).await.unwrap();
        assert!(store.remove("k").await.unwrap());
        assert!(!store
            .compare_and_set("k", Some(b"v1"), b"v2".to_vec(), None)
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_window_slide_enforces_max() {
        let store = MemoryStore::new();
        let now = Utc::now().timestamp_millis();
        let ttl = Duration::from_secs(60);
        for i in 0..3u64 {
            let slide = store
                .window_slide("w", now - 1000, now, i, Some(3), ttl)
                .await
                .unwrap();
            assert!(slide.inserted);
            assert_eq!(slide.count, i as u32 + 1);
        }
        let slide = store
            .window_slide("w", now - 1000, now, 99, Some(3), ttl)
            .await
            .unwrap();
        assert!(!slide.inserted);
        assert_eq!(slide.count, 3);
    }

    #[tokio::test]
    async fn test_window_slide_prunes_old_markers() {
        let store = MemoryStore::new();
        let now = Utc::now().timestamp_millis();
        let ttl = Duration::from_secs(60);
        store
            .window_slide("w", now - 1000, now - 500, 1, None, ttl)
            .await
            .unwrap();
        // Cutoff past the first marker: it is gone before the count.
        let slide = store
            .window_slide("w", now - 100, now, 2, Some(1), ttl)
            .await
            .unwrap();
        assert!(slide.inserted);
        assert_eq!(slide.count, 1);
    }

    #[tokio::test]
    async fn test_outage_surfaces_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.get("k").await.unwrap().is_none());
    }
}
