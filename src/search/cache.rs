//! Embedding cache
//!
//! Maps `(model version, item kind, item id)` to a vector. The cache is an explicitly
//! constructed object shared by reference (`Arc<EmbeddingCache>`) between
//! concurrent calls:
//! - reads take a shared lock and bump an atomic access tick
//! - vectors are computed outside any lock, then inserted; if another caller
//!   inserted the same key first, its vector wins and is returned
//! - stored vectors are `Arc<[f32]>`, so a reader never sees a partial entry

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::embedder::Embedder;
use crate::core::config::EvictionPolicy;
use crate::core::error::Result;

/// What a cached vector embeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A message, keyed by message id
    Message,
    /// A query, keyed by its text
    Query,
}

/// Cache key: model version plus a message id or query text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub model_version: String,
    pub kind: ItemKind,
    pub item_id: String,
}

impl CacheKey {
    /// Key for a message embedding
    pub fn new(model_version: &str, item_id: &str) -> Self {
        Self {
            model_version: model_version.to_string(),
            kind: ItemKind::Message,
            item_id: item_id.to_string(),
        }
    }

    /// Key for a query embedding
    pub fn query(model_version: &str, text: &str) -> Self {
        Self {
            kind: ItemKind::Query,
            ..Self::new(model_version, text)
        }
    }
}

/// A stored embedding
#[derive(Debug)]
pub struct EmbeddingEntry {
    pub vector: Arc<[f32]>,
    pub created_at: DateTime<Utc>,
    inserted_tick: u64,
    last_access: AtomicU64,
}

impl EmbeddingEntry {
    fn rank(&self, policy: EvictionPolicy) -> u64 {
        match policy {
            EvictionPolicy::Lru => self.last_access.load(Ordering::Relaxed),
            EvictionPolicy::Fifo => self.inserted_tick,
        }
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// Bounded, thread-safe embedding cache
pub struct EmbeddingCache {
    capacity: usize,
    policy: EvictionPolicy,
    entries: RwLock<HashMap<CacheKey, EmbeddingEntry>>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` vectors; 0 disables storage
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            capacity,
            policy,
            entries: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a vector, counting a hit or miss
    pub fn get(&self, key: &CacheKey) -> Option<Arc<[f32]>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) => {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.vector))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a vector unless the key is already present
    ///
    /// Returns the stored vector, which is the earlier one when two callers
    /// raced to compute the same key.
    pub fn insert(&self, key: CacheKey, vector: Vec<f32>) -> Arc<[f32]> {
        let vector: Arc<[f32]> = Arc::from(vector);
        if self.capacity == 0 {
            return vector;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&key) {
            existing.last_access.store(self.tick(), Ordering::Relaxed);
            return Arc::clone(&existing.vector);
        }

        if entries.len() >= self.capacity {
            let evicted = self.evict(&mut entries);
            tracing::debug!(evicted, capacity = self.capacity, "Embedding cache eviction");
        }

        let tick = self.tick();
        entries.insert(
            key,
            EmbeddingEntry {
                vector: Arc::clone(&vector),
                created_at: Utc::now(),
                inserted_tick: tick,
                last_access: AtomicU64::new(tick),
            },
        );
        self.inserts.fetch_add(1, Ordering::Relaxed);
        vector
    }

    /// Read-through lookup; computes with `compute` on a miss
    pub fn get_or_insert_with<F>(&self, key: CacheKey, compute: F) -> Result<Arc<[f32]>>
    where
        F: FnOnce() -> Result<Vec<f32>>,
    {
        if let Some(vector) = self.get(&key) {
            return Ok(vector);
        }
        let vector = compute()?;
        Ok(self.insert(key, vector))
    }

    /// Embedding of a message, keyed by the embedder's model version
    pub fn get_or_compute(
        &self,
        embedder: &dyn Embedder,
        message_id: &str,
        text: &str,
    ) -> Result<Arc<[f32]>> {
        let key = CacheKey::new(embedder.name(), message_id);
        self.get_or_insert_with(key, || embedder.embed(text))
    }

    /// Embedding of a query string
    pub fn get_or_compute_query(&self, embedder: &dyn Embedder, query: &str) -> Result<Arc<[f32]>> {
        let key = CacheKey::query(embedder.name(), query);
        self.get_or_insert_with(key, || embedder.embed(query))
    }

    /// Remove entries until a slot is free; returns the number removed
    ///
    /// Evicts a tenth of the capacity at a time so bulk inserts do not rescan
    /// the whole map on every call.
    fn evict(&self, entries: &mut HashMap<CacheKey, EmbeddingEntry>) -> usize {
        let batch = (self.capacity / 10).max(1);
        let target = entries.len() + 1 - self.capacity.min(entries.len() + 1);
        let count = target.max(batch).min(entries.len());

        let mut ranked: Vec<(u64, CacheKey)> = entries
            .iter()
            .map(|(key, entry)| (entry.rank(self.policy), key.clone()))
            .collect();
        ranked.sort_unstable_by_key(|(rank, _)| *rank);

        for (_, key) in ranked.into_iter().take(count) {
            entries.remove(&key);
        }
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedder::HashingEmbedder;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn key(id: &str) -> CacheKey {
        CacheKey::new("m1", id)
    }

    #[test]
    fn test_read_through() {
        let cache = EmbeddingCache::new(10, EvictionPolicy::Lru);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let v = cache
                .get_or_insert_with(key("a"), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1.0, 2.0])
                })
                .unwrap();
            assert_eq!(&*v, &[1.0, 2.0]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let metrics = cache.metrics();
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hits, 2);
        assert_eq!(metrics.inserts, 1);
    }

    #[test]
    fn test_model_version_is_part_of_key() {
        let cache = EmbeddingCache::new(10, EvictionPolicy::Lru);
        cache.insert(CacheKey::new("m1", "a"), vec![1.0]);
        assert!(cache.get(&CacheKey::new("m2", "a")).is_none());
        assert!(cache.get(&CacheKey::new("m1", "a")).is_some());
    }

    #[test]
    fn test_first_insert_wins() {
        let cache = EmbeddingCache::new(10, EvictionPolicy::Lru);
        let first = cache.insert(key("a"), vec![1.0]);
        let second = cache.insert(key("a"), vec![2.0]);
        assert_eq!(&*first, &[1.0]);
        assert_eq!(&*second, &[1.0]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = EmbeddingCache::new(2, EvictionPolicy::Lru);
        cache.insert(key("a"), vec![1.0]);
        cache.insert(key("b"), vec![2.0]);
        // touch "a" so "b" becomes least recently used
        assert!(cache.get(&key("a")).is_some());
        cache.insert(key("c"), vec![3.0]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("c")).is_some());
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[test]
    fn test_fifo_eviction_ignores_reads() {
        let cache = EmbeddingCache::new(2, EvictionPolicy::Fifo);
        cache.insert(key("a"), vec![1.0]);
        cache.insert(key("b"), vec![2.0]);
        assert!(cache.get(&key("a")).is_some());
        cache.insert(key("c"), vec![3.0]);

        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("b")).is_some());
    }

    #[test]
    fn test_zero_capacity_disables_storage() {
        let cache = EmbeddingCache::new(0, EvictionPolicy::Lru);
        let v = cache.insert(key("a"), vec![1.0]);
        assert_eq!(&*v, &[1.0]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_compute_error_is_not_cached() {
        let cache = EmbeddingCache::new(4, EvictionPolicy::Lru);
        let result = cache.get_or_insert_with(key("a"), || {
            Err(crate::core::error::SearchError::EmbeddingUnavailable(
                "offline".to_string(),
            ))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_insert_converges() {
        let cache = Arc::new(EmbeddingCache::new(64, EvictionPolicy::Lru));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    cache
                        .get_or_insert_with(key("shared"), || Ok(vec![i as f32; 4]))
                        .unwrap()
                })
            })
            .collect();

        let vectors: Vec<Arc<[f32]>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let stored = cache.get(&key("shared")).unwrap();

        assert!(vectors.iter().all(|v| **v == *stored));
        assert_eq!(cache.len(), 1);
        assert_eq!(stored.len(), 4);
    }

    #[test]
    fn test_concurrent_eviction_keeps_bound() {
        let cache = Arc::new(EmbeddingCache::new(16, EvictionPolicy::Lru));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100 {
                        let k = key(&format!("{}-{}", t, i));
                        cache.insert(k.clone(), vec![i as f32]);
                        let _ = cache.get(&k);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.len() <= 16);
    }

    #[test]
    fn test_get_or_compute_uses_model_name() {
        let cache = EmbeddingCache::new(8, EvictionPolicy::Lru);
        let embedder = HashingEmbedder::new();
        cache.get_or_compute(&embedder, "spaces/A/messages/1", "hello").unwrap();
        assert!(cache
            .get(&CacheKey::new("hashing-384", "spaces/A/messages/1"))
            .is_some());

        cache.get_or_compute_query(&embedder, "hello").unwrap();
        assert!(cache.get(&CacheKey::query("hashing-384", "hello")).is_some());
    }

    #[test]
    fn test_query_and_message_keys_do_not_collide() {
        let cache = EmbeddingCache::new(8, EvictionPolicy::Lru);
        let embedder = HashingEmbedder::new();

        let message = cache
            .get_or_compute(&embedder, "query:budget", "team lunch on friday")
            .unwrap();
        let query = cache.get_or_compute_query(&embedder, "budget").unwrap();

        assert_eq!(cache.len(), 2);
        assert_ne!(*message, *query);
        assert_eq!(embedder.embed("budget").unwrap(), query.to_vec());
    }
}
