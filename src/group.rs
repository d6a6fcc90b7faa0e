//! The distributed cache group.
//!
//! A group is one named cache: a byte capacity, a generator that computes
//! missing values, a main tier for keys this node owns, and a hot tier for
//! owner-foreign keys served here recently. Lookups consult main, then hot,
//! then — under the single-flight coordinator — either the owning peer or
//! the generator. Results are admitted to exactly one tier; failures are
//! broadcast to every coalesced waiter and never cached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cluster::ClusterContext;
use crate::error::FetchError;
use crate::singleflight::SingleFlight;
use crate::tier::{ByteLru, TierStats};

/// Computes the value for a cache key on a local miss.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, key: &str) -> Result<Bytes, FetchError>;
}

/// Which tier a stats query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Main,
    Hot,
}

/// Group-level load counters, serialized into `/stats` responses.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupStats {
    pub gets: u64,
    pub cache_hits: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
    pub local_loads: u64,
    pub local_load_errs: u64,
}

struct GroupInner {
    name: String,
    capacity: u64,
    main: ByteLru,
    hot: ByteLru,
    flights: SingleFlight,
    generator: Arc<dyn Generator>,
    cluster: Arc<ClusterContext>,
    gets: AtomicU64,
    cache_hits: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    local_loads: AtomicU64,
    local_load_errs: AtomicU64,
}

/// Cheaply cloneable handle; all clones share the same tiers and flights.
#[derive(Clone)]
pub struct Group {
    inner: Arc<GroupInner>,
}

impl Group {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        capacity: u64,
        generator: Arc<dyn Generator>,
        cluster: Arc<ClusterContext>,
    ) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                name: name.into(),
                capacity,
                main: ByteLru::new(),
                hot: ByteLru::new(),
                flights: SingleFlight::new(),
                generator,
                cluster,
                gets: AtomicU64::new(0),
                cache_hits: AtomicU64::new(0),
                peer_loads: AtomicU64::new(0),
                peer_errors: AtomicU64::new(0),
                local_loads: AtomicU64::new(0),
                local_load_errs: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Fetch the value for `key`: local tiers, then the owning peer or the
    /// generator, with concurrent identical requests coalesced.
    pub async fn get(&self, key: &str) -> Result<Bytes, FetchError> {
        let inner = &self.inner;
        inner.gets.fetch_add(1, Ordering::Relaxed);

        if let Some(value) = self.lookup_local(key) {
            inner.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let this = self.clone();
        let owned_key = key.to_string();
        inner
            .flights
            .run(key, move || async move { this.load(&owned_key).await })
            .await
    }

    /// Snapshot of one tier's counters.
    #[must_use]
    pub fn cache_stats(&self, which: CacheKind) -> TierStats {
        match which {
            CacheKind::Main => self.inner.main.stats(),
            CacheKind::Hot => self.inner.hot.stats(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> GroupStats {
        let inner = &self.inner;
        GroupStats {
            gets: inner.gets.load(Ordering::Relaxed),
            cache_hits: inner.cache_hits.load(Ordering::Relaxed),
            peer_loads: inner.peer_loads.load(Ordering::Relaxed),
            peer_errors: inner.peer_errors.load(Ordering::Relaxed),
            local_loads: inner.local_loads.load(Ordering::Relaxed),
            local_load_errs: inner.local_load_errs.load(Ordering::Relaxed),
        }
    }

    /// Loads currently in flight on this node (for `/stats`).
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.flights.in_flight()
    }

    fn lookup_local(&self, key: &str) -> Option<Bytes> {
        self.inner
            .main
            .get(key)
            .or_else(|| self.inner.hot.get(key))
    }

    async fn load(&self, key: &str) -> Result<Bytes, FetchError> {
        let inner = &self.inner;

        // A racing flight may have admitted the value between the caller's
        // miss and this flight starting.
        if let Some(value) = self.lookup_local(key) {
            return Ok(value);
        }

        if let Some(peer) = inner.cluster.pick_peer(key) {
            match inner
                .cluster
                .fetch_from_peer(&peer, &inner.name, key)
                .await
            {
                Ok(value) => {
                    inner.peer_loads.fetch_add(1, Ordering::Relaxed);
                    self.admit(CacheKind::Hot, key, value.clone());
                    debug!(group = %inner.name, %peer, key, "served from peer");
                    Ok(value)
                }
                Err(err) => {
                    // Do not regenerate locally: that would double-fetch the
                    // origin and break the partitioning invariant.
                    inner.peer_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(group = %inner.name, %peer, key, %err, "peer load failed");
                    Err(err)
                }
            }
        } else {
            match inner.generator.generate(key).await {
                Ok(value) => {
                    inner.local_loads.fetch_add(1, Ordering::Relaxed);
                    self.admit(CacheKind::Main, key, value.clone());
                    Ok(value)
                }
                Err(err) => {
                    inner.local_load_errs.fetch_add(1, Ordering::Relaxed);
                    Err(err)
                }
            }
        }
    }

    /// Admit a value to one tier, then trim synchronously: the hot tier may
    /// hold at most an eighth of the capacity, and main plus hot together
    /// stay at or under the capacity.
    fn admit(&self, which: CacheKind, key: &str, value: Bytes) {
        let inner = &self.inner;
        match which {
            CacheKind::Main => inner.main.insert(key, value),
            CacheKind::Hot => inner.hot.insert(key, value),
        }

        let hot_cap = inner.capacity / 8;
        while inner.hot.bytes() > hot_cap {
            if !inner.hot.evict_oldest() {
                break;
            }
        }
        while inner.main.bytes() + inner.hot.bytes() > inner.capacity {
            let from_hot = inner.hot.bytes() > inner.main.bytes() / 8;
            let evicted = if from_hot {
                inner.hot.evict_oldest()
            } else {
                inner.main.evict_oldest()
            };
            if !evicted {
                let other = if from_hot {
                    inner.main.evict_oldest()
                } else {
                    inner.hot.evict_oldest()
                };
                if !other {
                    break;
                }
            }
        }
    }

    /// Whether a tier currently holds `key`, without touching recency.
    /// Used by the partitioning and capacity tests.
    #[must_use]
    pub fn tier_contains(&self, which: CacheKind, key: &str) -> bool {
        match which {
            CacheKind::Main => self.inner.main.contains(key),
            CacheKind::Hot => self.inner.hot.contains(key),
        }
    }
}
