//! In-process `TtlStore` backed by a sharded concurrent map.
//!
//! Reads and writes on different keys never contend on a global lock. Expired entries are
//! evicted lazily on read and by `purge_expired`, which `main` runs on an interval.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::{CacheError, TtlStore};

/// Expiry used when `now + ttl` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TtlStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return Ok(None),
            Some(stored) if stored.expires_at > now => return Ok(Some(stored.value.clone())),
            Some(_) => {}
        }

        // Expired: evict unless a fresh value was written in between.
        self.entries.remove_if(key, |_, stored| stored.expires_at <= now);
        Ok(None)
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let fresh = StoredValue {
            value,
            expires_at: expiry(now, ttl),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return Ok(false);
                }
                occupied.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }
}

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_put_if_absent_rejects_second_writer() {
        let store = MemoryStore::new();
        assert!(store
            .put_if_absent("k", "first".to_string(), Duration::from_secs(10))
            .await
            .unwrap());
        assert!(!store
            .put_if_absent("k", "second".to_string(), Duration::from_secs(10))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reads_as_absent_and_is_evicted() {
        let store = MemoryStore::new();
        store
            .put_if_absent("k", "v".to_string(), Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty(), "lazy eviction should remove the expired key");
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates_instead_of_overflowing() {
        let store = MemoryStore::new();
        assert!(store
            .put_if_absent("k", "v".to_string(), Duration::from_secs(u64::MAX))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(!store
            .put_if_absent("k", "w".to_string(), Duration::MAX)
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_can_be_rewritten() {
        let store = MemoryStore::new();
        store
            .put_if_absent("k", "old".to_string(), Duration::from_secs(1))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(store
            .put_if_absent("k", "new".to_string(), Duration::from_secs(10))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_only_removes_stale_keys() {
        let store = MemoryStore::new();
        store
            .put_if_absent("short", "v".to_string(), Duration::from_secs(1))
            .await
            .unwrap();
        store
            .put_if_absent("long", "v".to_string(), Duration::from_secs(100))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_writers_exactly_one_wins() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put_if_absent("shared", format!("writer-{i}"), Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
