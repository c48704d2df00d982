//! Per-kind TTL result cache.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::CachePolicy;
use crate::observability::metrics;
use crate::operation::OperationKind;

/// A full cache evicts `max_entries / EVICTION_BATCH_DIVISOR` entries at once.
const EVICTION_BATCH_DIVISOR: usize = 64;

/// Operation kind plus canonicalized parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: OperationKind,
    params: String,
}

impl CacheKey {
    pub fn new(kind: OperationKind, params: impl Into<String>) -> Self {
        Self {
            kind,
            params: params.into(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn params(&self) -> &str {
        &self.params
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    /// `None` never expires.
    expires_at: Option<Instant>,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Thread-safe cache of successful operation payloads.
///
/// Only successes are stored; a failure is never served from here. When
/// full, expired entries go first, then the oldest stored ones.
#[derive(Clone)]
pub struct ResultCache {
    inner: Arc<DashMap<CacheKey, CacheEntry>>,
    max_entries: usize,
}

impl ResultCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            max_entries,
        }
    }

    /// Return a fresh value, evicting it if it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();
        let fresh = match self.inner.get(key) {
            Some(entry) if entry.is_fresh(now) => Some(entry.value.clone()),
            _ => None,
        };

        if fresh.is_none() {
            self.inner.remove_if(key, |_, entry| !entry.is_fresh(now));
        }
        metrics::record_cache_lookup(key.kind.as_str(), fresh.is_some());
        fresh
    }

    /// Store a value under the kind's policy.
    pub fn put(&self, key: CacheKey, value: Value, policy: CachePolicy) {
        let now = Instant::now();
        let expires_at = match policy {
            CachePolicy::Disabled => return,
            // A TTL too large to represent never expires.
            CachePolicy::Ttl(ttl) => now.checked_add(ttl),
            CachePolicy::Forever => None,
        };

        if self.inner.len() >= self.max_entries && !self.inner.contains_key(&key) {
            self.purge_expired();
            if self.inner.len() >= self.max_entries {
                self.evict_oldest();
            }
        }

        self.inner.insert(
            key,
            CacheEntry {
                value,
                expires_at,
                stored_at: now,
            },
        );
        metrics::record_cache_size(self.inner.len());
    }

    /// Make room by dropping the oldest entries, a batch at a time so a full
    /// cache is not rescanned on every insert.
    fn evict_oldest(&self) {
        let batch = (self.max_entries / EVICTION_BATCH_DIVISOR).max(1);
        let mut ages: Vec<(Instant, CacheKey)> = self
            .inner
            .iter()
            .map(|entry| (entry.stored_at, entry.key().clone()))
            .collect();
        if ages.len() > batch {
            ages.select_nth_unstable_by_key(batch - 1, |(stored_at, _)| *stored_at);
            ages.truncate(batch);
        }

        let evicted = ages
            .into_iter()
            .filter(|(_, key)| self.inner.remove(key).is_some())
            .count();
        tracing::debug!(evicted, "Result cache full, evicted oldest entries");
        metrics::record_cache_evictions(evicted);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.is_fresh(now));
        let removed = before.saturating_sub(self.inner.len());
        if removed > 0 {
            tracing::debug!(removed, "Purged expired cache entries");
            metrics::record_cache_size(self.inner.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}
