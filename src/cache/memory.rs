//! In-process `Cache` implementation backed by `dashmap`, used as the
//! default until a persistent cache backend is configured: a concurrent
//! map behind a small façade type rather than a lock reached for directly.

use super::{Cache, CacheEntry};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Utc::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.bytes.clone()),
            Some(_) => {
                drop(self.entries.remove(key));
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl, Utc::now());
        self.entries.insert(key.to_string(), entry);
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_entries_are_treated_as_absent() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::milliseconds(-1)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn fresh_entries_round_trip() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::hours(1)).await;
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn delete_removes_the_entry() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::hours(1)).await;
        cache.delete("k").await;
        assert!(cache.get("k").await.is_none());
    }
}
