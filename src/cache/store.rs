//! Render cache storage.

use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "router_ssr_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "router_ssr_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "router_ssr_cache_evict_total";
pub(crate) const METRIC_CACHE_EXPIRED: &str = "router_ssr_cache_expired_total";

#[derive(Clone)]
struct Entry {
    document: Bytes,
    inserted_at: Instant,
}

impl Entry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

/// Bounded, time-limited store of patched documents.
///
/// Capacity overflow evicts the least-recently-used entry. Each entry expires
/// a fixed duration after insertion regardless of how often it is read.
/// There is no partial invalidation: pages whose content varies by anything
/// not captured in [`CacheKey`] must not be cached.
pub struct RenderCache {
    entries: Mutex<LruCache<CacheKey, Entry>>,
    ttl: Duration,
}

impl RenderCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity_non_zero())),
            ttl: config.ttl(),
        }
    }

    /// Look up a fresh entry, promoting it to most-recently-used.
    ///
    /// Expired entries are dropped on the way out and reported as misses.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");

        let expired = match entries.peek(key) {
            Some(entry) => entry.is_expired(self.ttl, now),
            None => {
                counter!(METRIC_CACHE_MISS).increment(1);
                return None;
            }
        };

        if expired {
            entries.pop(key);
            counter!(METRIC_CACHE_EXPIRED).increment(1);
            counter!(METRIC_CACHE_MISS).increment(1);
            debug!(cache = "render", outcome = "expired", key = %key);
            return None;
        }

        counter!(METRIC_CACHE_HIT).increment(1);
        entries.get(key).map(|entry| entry.document.clone())
    }

    /// Report whether a fresh entry exists without touching its recency.
    pub fn has(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        mutex_lock(&self.entries, SOURCE, "has")
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(self.ttl, now))
    }

    /// Insert or overwrite the document for `key`.
    ///
    /// Returns the key evicted to make room, if any. Overwriting an existing
    /// key is not an eviction.
    pub fn set(&self, key: CacheKey, document: Bytes) -> Option<CacheKey> {
        let entry = Entry {
            document,
            inserted_at: Instant::now(),
        };
        let displaced = mutex_lock(&self.entries, SOURCE, "set").push(key.clone(), entry);

        match displaced {
            Some((displaced_key, _)) if displaced_key != key => {
                counter!(METRIC_CACHE_EVICT).increment(1);
                debug!(cache = "render", evicted = %displaced_key, "capacity eviction");
                Some(displaced_key)
            }
            _ => None,
        }
    }

    /// Number of stored entries, including ones that expired but were not read since.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "capacity").cap().get()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::ssr::ViewerId;

    fn key(viewer: &str, url: &str) -> CacheKey {
        CacheKey::new(ViewerId::user(viewer), url)
    }

    #[test]
    fn roundtrip_and_overwrite() {
        let cache = RenderCache::new(&CacheConfig::default());
        let k = key("a", "/p");

        assert!(cache.get(&k).is_none());
        assert!(!cache.has(&k));

        assert!(cache.set(k.clone(), Bytes::from("first")).is_none());
        assert!(cache.has(&k));
        assert_eq!(cache.get(&k), Some(Bytes::from("first")));

        // Overwrite is not reported as an eviction.
        assert!(cache.set(k.clone(), Bytes::from("second")).is_none());
        assert_eq!(cache.get(&k), Some(Bytes::from("second")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn viewer_scoped_entries_are_isolated() {
        let cache = RenderCache::new(&CacheConfig::default());
        cache.set(key("a", "/p"), Bytes::from("for a"));

        assert!(cache.get(&key("b", "/p")).is_none());
        assert!(cache.get(&CacheKey::new(ViewerId::Anonymous, "/p")).is_none());
    }

    #[test]
    fn overflow_evicts_least_recently_used() {
        let config = CacheConfig {
            capacity: 3,
            ..Default::default()
        };
        let cache = RenderCache::new(&config);

        for i in 0..3 {
            cache.set(key("a", &format!("/{i}")), Bytes::from("doc"));
        }
        let evicted = cache.set(key("a", "/3"), Bytes::from("doc"));

        assert_eq!(evicted, Some(key("a", "/0")));
        assert!(cache.get(&key("a", "/0")).is_none());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn reads_refresh_recency() {
        let config = CacheConfig {
            capacity: 2,
            ..Default::default()
        };
        let cache = RenderCache::new(&config);

        cache.set(key("a", "/0"), Bytes::from("zero"));
        cache.set(key("a", "/1"), Bytes::from("one"));
        assert!(cache.get(&key("a", "/0")).is_some());

        let evicted = cache.set(key("a", "/2"), Bytes::from("two"));
        assert_eq!(evicted, Some(key("a", "/1")));
        assert!(cache.has(&key("a", "/0")));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl_regardless_of_reads() {
        let config = CacheConfig {
            ttl_seconds: 60,
            ..Default::default()
        };
        let cache = RenderCache::new(&config);
        let k = key("a", "/p");
        cache.set(k.clone(), Bytes::from("doc"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get(&k).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cache.has(&k));
        assert!(cache.get(&k).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn recovers_from_poisoned_lock() {
        let cache = RenderCache::new(&CacheConfig::default());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache
                .entries
                .lock()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        cache.set(key("a", "/p"), Bytes::from("doc"));
        assert!(cache.get(&key("a", "/p")).is_some());
    }
}
