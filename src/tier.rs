//! Byte-accounted LRU tier.
//!
//! One tier backs either the main cache (keys this node owns) or the hot
//! cache (owner-foreign keys served here recently). The LRU order lives in
//! an unbounded `lru::LruCache` behind a `parking_lot` mutex; capacity is
//! enforced by the owning group, which evicts across tiers at admission time.
//! An entry is charged `key.len() + value.len()` bytes.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

/// Snapshot of one tier, serialized into `/stats` responses. Field names
/// match the legacy stats wire shape.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct TierStats {
    pub bytes: u64,
    pub items: u64,
    pub gets: u64,
    pub hits: u64,
    pub evictions: u64,
}

struct TierInner {
    entries: LruCache<String, Bytes>,
    bytes: u64,
}

/// A single LRU tier with byte accounting and hit/eviction counters.
pub struct ByteLru {
    inner: Mutex<TierInner>,
    gets: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
}

impl ByteLru {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TierInner {
                // Unbounded: the group trims by bytes, not entry count.
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
            gets: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up and touch. `Bytes` clones are refcounted, so hits are cheap.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        let value = inner.entries.get(key).cloned();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Membership check without disturbing recency. Used by invariant tests.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Insert or replace, keeping the byte account exact.
    pub fn insert(&self, key: &str, value: Bytes) {
        let mut inner = self.inner.lock();
        let charged = (key.len() + value.len()) as u64;
        if let Some(old) = inner.entries.put(key.to_string(), value) {
            inner.bytes -= (key.len() + old.len()) as u64;
        }
        inner.bytes += charged;
    }

    /// Drop the least-recently-used entry. Returns false when empty.
    pub fn evict_oldest(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.pop_lru() {
            Some((key, value)) => {
                inner.bytes -= (key.len() + value.len()) as u64;
                self.evictions.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn bytes(&self) -> u64 {
        self.inner.lock().bytes
    }

    pub fn items(&self) -> u64 {
        self.inner.lock().entries.len() as u64
    }

    pub fn stats(&self) -> TierStats {
        let inner = self.inner.lock();
        TierStats {
            bytes: inner.bytes,
            items: inner.entries.len() as u64,
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for ByteLru {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_accounting_tracks_inserts_and_replacements() {
        let tier = ByteLru::new();
        tier.insert("k", Bytes::from_static(b"12345"));
        assert_eq!(tier.bytes(), 6);
        tier.insert("k", Bytes::from_static(b"123"));
        assert_eq!(tier.bytes(), 4);
        assert_eq!(tier.items(), 1);
    }

    #[test]
    fn eviction_is_least_recently_used() {
        let tier = ByteLru::new();
        tier.insert("a", Bytes::from_static(b"x"));
        tier.insert("b", Bytes::from_static(b"y"));
        // Touch "a" so "b" becomes the eviction victim.
        assert!(tier.get("a").is_some());
        assert!(tier.evict_oldest());
        assert!(tier.contains("a"));
        assert!(!tier.contains("b"));
        assert_eq!(tier.stats().evictions, 1);
    }

    #[test]
    fn stats_count_gets_and_hits() {
        let tier = ByteLru::new();
        tier.insert("a", Bytes::from_static(b"x"));
        let _ = tier.get("a");
        let _ = tier.get("missing");
        let stats = tier.stats();
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.hits, 1);
    }
}
