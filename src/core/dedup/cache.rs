//! Similarity context: frozen config plus an optional memo cache.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;

use super::similarity::{content_hash, similarity, SimilarityConfig, SimilarityResult};

/// Decides whether a cached entry is still usable.
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    fn is_expired(&self, inserted: Instant, now: Instant) -> bool;
}

/// Entries expire `ttl` after insertion; capacity eviction is LRU.
#[derive(Debug, Clone, Copy)]
pub struct LruTtl {
    pub ttl: Duration,
}

impl EvictionPolicy for LruTtl {
    fn is_expired(&self, inserted: Instant, now: Instant) -> bool {
        now.duration_since(inserted) >= self.ttl
    }
}

/// Entries only leave the cache through capacity eviction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExpiry;

impl EvictionPolicy for NoExpiry {
    fn is_expired(&self, _inserted: Instant, _now: Instant) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

struct CacheEntry {
    result: SimilarityResult,
    inserted: Instant,
}

pub struct SimilarityCache {
    entries: LruCache<(u64, u64), CacheEntry>,
    policy: Box<dyn EvictionPolicy>,
    hits: usize,
    misses: usize,
}

impl fmt::Debug for SimilarityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimilarityCache")
            .field("entries", &self.entries.len())
            .field("policy", &self.policy)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

impl SimilarityCache {
    pub fn new(capacity: NonZeroUsize, policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            entries: LruCache::new(capacity),
            policy,
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: (u64, u64), now: Instant) -> Option<SimilarityResult> {
        let expired = match self.entries.get(&key) {
            Some(entry) if !self.policy.is_expired(entry.inserted, now) => {
                self.hits += 1;
                return Some(entry.result);
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.pop(&key);
        }
        self.misses += 1;
        None
    }

    fn put(&mut self, key: (u64, u64), result: SimilarityResult, now: Instant) {
        self.entries.put(
            key,
            CacheEntry {
                result,
                inserted: now,
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

/// Explicit similarity context. Safe to share across threads.
#[derive(Debug)]
pub struct SimilarityContext {
    config: SimilarityConfig,
    cache: Option<Mutex<SimilarityCache>>,
}

impl SimilarityContext {
    pub fn new(config: SimilarityConfig) -> Self {
        Self {
            config,
            cache: None,
        }
    }

    /// A capacity of zero disables caching.
    pub fn with_cache(
        config: SimilarityConfig,
        capacity: usize,
        policy: impl EvictionPolicy + 'static,
    ) -> Self {
        let cache = NonZeroUsize::new(capacity)
            .map(|cap| Mutex::new(SimilarityCache::new(cap, Box::new(policy))));
        Self { config, cache }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    pub fn compare(&self, code_a: &str, code_b: &str) -> SimilarityResult {
        let Some(cache) = &self.cache else {
            return similarity(code_a, code_b, &self.config);
        };

        let (ha, hb) = (content_hash(code_a), content_hash(code_b));
        let key = (ha.min(hb), ha.max(hb));
        let now = Instant::now();

        if let Some(hit) = cache.lock().unwrap_or_else(|e| e.into_inner()).get(key, now) {
            return hit;
        }
        // Computed outside the lock so parallel comparisons don't serialize.
        let result = similarity(code_a, code_b, &self.config);
        cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(key, result, now);
        result
    }

    pub fn stats(&self) -> Option<CacheStats> {
        self.cache
            .as_ref()
            .map(|c| c.lock().unwrap_or_else(|e| e.into_inner()).stats())
    }
}
