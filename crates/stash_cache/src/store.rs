use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::{entry::CacheEntry, key::CacheKey};

/// =======================================================
/// IN-MEMORY CACHE STORE
/// =======================================================
///
/// Shared by every connection task (`Arc<CacheStore>`), so the map is a
/// `DashMap`: lookups and stores on the same key from different worker
/// threads are serialized per shard.
///
/// - No TTL, no eviction: grows with the number of distinct keys
/// - Entries are replaced wholesale ("last write wins")
/// - Only `clear()` removes entries
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
}

/// Point-in-time counters of a [`CacheStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let found = self.entries.get(key).map(|entry| Arc::clone(entry.value()));

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }

        found
    }

    pub fn store(&self, key: CacheKey, entry: CacheEntry) {
        debug!(
            target: "stash::cache",
            key = %key,
            body_len = entry.body_len(),
            "Storing cache entry"
        );
        self.entries.insert(key, Arc::new(entry));
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        info!(target: "stash::cache", dropped, "Cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CacheStore;
    use crate::{CacheEntry, CacheKey};
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, Method};

    fn entry(body: &'static str) -> CacheEntry {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        CacheEntry::new(headers, Bytes::from_static(body.as_bytes()))
    }

    #[test]
    fn lookup_on_empty_store_misses() {
        let store = CacheStore::new();
        let key = CacheKey::derive(&Method::GET, "/a", None);
        assert!(store.lookup(&key).is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn store_then_lookup_returns_entry() {
        let store = CacheStore::new();
        let key = CacheKey::derive(&Method::GET, "/a", None);
        store.store(key.clone(), entry("x"));

        let found = store.lookup(&key).expect("entry stored");
        assert_eq!(found.body, Bytes::from_static(b"x"));
        assert_eq!(found.headers["content-type"], "text/plain");
        assert!(store.contains(&key));
        assert_eq!(store.stats().hits, 1);
    }

    #[test]
    fn store_overwrites_silently() {
        let store = CacheStore::new();
        let key = CacheKey::derive(&Method::GET, "/a", None);
        store.store(key.clone(), entry("old"));
        store.store(key.clone(), entry("new"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(&key).unwrap().body, Bytes::from_static(b"new"));
    }

    #[test]
    fn clear_removes_everything() {
        let store = CacheStore::new();
        let a = CacheKey::derive(&Method::GET, "/a", None);
        let b = CacheKey::derive(&Method::POST, "/b", Some(b"body"));
        store.store(a.clone(), entry("a"));
        store.store(b.clone(), entry("b"));

        store.clear();

        assert!(store.is_empty());
        assert!(store.lookup(&a).is_none());
        assert!(!store.contains(&b));
    }
}
