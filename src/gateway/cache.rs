//! In-process cache of rendered public responses.
//!
//! Entries are keyed by tenant and request, expire after a fixed TTL and are
//! dropped per tenant whenever that tenant's content may have changed.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::PublicApiConfig;

/// Identifies one cacheable public read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant_id: Uuid,
    pub request: String,
}

impl CacheKey {
    pub fn new(tenant_id: Uuid, request: impl Into<String>) -> Self {
        Self {
            tenant_id,
            request: request.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    body: Bytes,
    stored_at: Instant,
}

/// Shared LRU of serialized response bodies.
#[derive(Clone)]
pub struct PublicCache {
    entries: Arc<Mutex<LruCache<CacheKey, Entry>>>,
    ttl: Duration,
}

impl PublicCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            ttl,
        }
    }

    pub fn from_config(config: &PublicApiConfig) -> Self {
        Self::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_seconds),
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh body for `key`, if any. Stale entries are evicted on access.
    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let mut entries = self.entries.lock().await;
        let fresh = entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.body.clone());

        if fresh.is_none() {
            entries.pop(key);
        }
        fresh
    }

    pub async fn insert(&self, key: CacheKey, body: Bytes) {
        self.entries.lock().await.put(
            key,
            Entry {
                body,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every cached response of `tenant_id`.
    pub async fn invalidate_tenant(&self, tenant_id: Uuid) {
        let mut entries = self.entries.lock().await;
        let stale: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, _)| key.tenant_id == tenant_id)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            entries.pop(key);
        }

        if !stale.is_empty() {
            tracing::debug!(%tenant_id, evicted = stale.len(), "Public cache invalidated");
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_fresh_entries() {
        let cache = PublicCache::new(8, Duration::from_secs(60));
        let key = CacheKey::new(Uuid::new_v4(), "menu");

        assert!(cache.get(&key).await.is_none());
        cache.insert(key.clone(), Bytes::from_static(b"{}")).await;
        assert_eq!(cache.get(&key).await, Some(Bytes::from_static(b"{}")));
    }

    #[tokio::test]
    async fn expired_entries_are_evicted() {
        let cache = PublicCache::new(8, Duration::from_millis(10));
        let key = CacheKey::new(Uuid::new_v4(), "menu");

        cache.insert(key.clone(), Bytes::from_static(b"{}")).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.get(&key).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn invalidation_is_per_tenant() {
        let cache = PublicCache::new(8, Duration::from_secs(60));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        cache.insert(CacheKey::new(a, "menu"), Bytes::from_static(b"a1")).await;
        cache.insert(CacheKey::new(a, "pages"), Bytes::from_static(b"a2")).await;
        cache.insert(CacheKey::new(b, "menu"), Bytes::from_static(b"b1")).await;

        cache.invalidate_tenant(a).await;

        assert_eq!(cache.len().await, 1);
        assert!(cache.get(&CacheKey::new(b, "menu")).await.is_some());
    }

    #[tokio::test]
    async fn capacity_is_bounded() {
        let cache = PublicCache::new(2, Duration::from_secs(60));
        let tenant = Uuid::new_v4();
        for request in ["a", "b", "c"] {
            cache
                .insert(CacheKey::new(tenant, request), Bytes::from_static(b"x"))
                .await;
        }
        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&CacheKey::new(tenant, "a")).await.is_none());
    }
}
