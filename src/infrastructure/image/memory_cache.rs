//! In-memory LRU image cache bounded by a byte budget.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use image::DynamicImage;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::domain::entities::CacheKey;
use crate::domain::ports::ImageCachePort;

/// Default byte budget for decoded images (64 MiB).
pub const DEFAULT_MEMORY_BUDGET: usize = 64 * 1024 * 1024;

struct Entry {
    image: Arc<DynamicImage>,
    size_bytes: usize,
}

struct Inner {
    entries: LruCache<CacheKey, Entry>,
    resident_bytes: usize,
}

impl Inner {
    fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.pop(key) {
            Some(old) => {
                self.resident_bytes -= old.size_bytes;
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, key: CacheKey, entry: Entry, budget: usize) -> usize {
        self.remove(&key);
        self.resident_bytes += entry.size_bytes;
        self.entries.put(key, entry);

        let mut evicted = 0;
        while self.resident_bytes > budget {
            let Some((old_key, old)) = self.entries.pop_lru() else {
                break;
            };
            self.resident_bytes -= old.size_bytes;
            evicted += 1;
            trace!(key = %old_key, size = old.size_bytes, "Evicted image from memory cache");
        }
        evicted
    }
}

/// In-memory LRU cache for decoded images.
/// Thread-safe; total resident bytes never exceed the budget.
pub struct MemoryImageCache {
    inner: RwLock<Inner>,
    budget: usize,
    len: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache holding at most `budget` bytes.
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: LruCache::unbounded(),
                resident_bytes: 0,
            }),
            budget,
            len: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default budget.
    #[must_use]
    pub fn with_default_budget() -> Self {
        Self::new(DEFAULT_MEMORY_BUDGET)
    }

    /// Configured byte budget.
    #[must_use]
    pub const fn budget(&self) -> usize {
        self.budget
    }

    /// Bytes currently accounted to cached images.
    pub async fn resident_bytes(&self) -> usize {
        self.inner.read().await.resident_bytes
    }

    /// Returns cache statistics.
    #[allow(clippy::cast_precision_loss)]
    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let inner = self.inner.read().await;
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: inner.entries.len(),
            resident_bytes: inner.resident_bytes,
            budget: self.budget,
        }
    }

    /// Peeks at an image without promoting it in the LRU.
    pub async fn peek(&self, key: &CacheKey) -> Option<Arc<DynamicImage>> {
        let inner = self.inner.read().await;
        inner.entries.peek(key).map(|e| e.image.clone())
    }

    /// Stores an image unless the key is already present.
    ///
    /// Returns the image now cached under `key`: the existing one if another
    /// writer got there first, otherwise `image`.
    pub async fn put_if_absent(
        &self,
        key: CacheKey,
        image: Arc<DynamicImage>,
        size_bytes: usize,
    ) -> Arc<DynamicImage> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.entries.get(&key) {
            trace!(key = %key, "Memory cache already populated");
            return existing.image.clone();
        }
        self.store(&mut inner, key, image.clone(), size_bytes);
        image
    }

    fn store(&self, inner: &mut Inner, key: CacheKey, image: Arc<DynamicImage>, size_bytes: usize) {
        if size_bytes > self.budget {
            debug!(key = %key, size = size_bytes, budget = self.budget, "Image exceeds memory budget, not caching");
            inner.remove(&key);
            self.len.store(inner.entries.len(), Ordering::Relaxed);
            return;
        }
        debug!(key = %key, size = size_bytes, "Storing image in memory cache");
        let evicted = inner.insert(key, Entry { image, size_bytes }, self.budget);
        if evicted > 0 {
            debug!(evicted, resident = inner.resident_bytes, "Memory cache over budget, evicted LRU entries");
        }
        self.len.store(inner.entries.len(), Ordering::Relaxed);
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_budget()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Bytes held by cached images.
    pub resident_bytes: usize,
    /// Configured byte budget.
    pub budget: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {}/{} bytes, {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.resident_bytes, self.budget, self.hit_rate, self.hits, self.misses
        )
    }
}

#[async_trait::async_trait]
impl ImageCachePort for MemoryImageCache {
    async fn get(&self, key: &CacheKey) -> Option<Arc<DynamicImage>> {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(entry.image.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    async fn put(&self, key: CacheKey, image: Arc<DynamicImage>, size_bytes: usize) {
        let mut inner = self.inner.write().await;
        self.store(&mut inner, key, image, size_bytes);
    }

    async fn evict(&self, key: &CacheKey) {
        let mut inner = self.inner.write().await;
        if inner.remove(key) {
            debug!(key = %key, "Evicted image from memory cache");
        }
        self.len.store(inner.entries.len(), Ordering::Relaxed);
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.resident_bytes = 0;
        self.len.store(0, Ordering::Relaxed);
        debug!("Cleared memory image cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey::source(name)
    }

    fn img() -> Arc<DynamicImage> {
        Arc::new(DynamicImage::new_rgb8(10, 10))
    }

    #[tokio::test]
    async fn test_cache_put_and_get() {
        let cache = MemoryImageCache::new(1024);
        let id = key("test1");
        let img = Arc::new(DynamicImage::new_rgb8(100, 100));

        cache.put(id.clone(), img.clone(), 100).await;
        let retrieved = cache.get(&id).await;

        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().width(), 100);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = MemoryImageCache::new(1024);
        assert!(cache.get(&key("nonexistent")).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_eviction_by_bytes() {
        let cache = MemoryImageCache::new(250);

        cache.put(key("test1"), img(), 100).await;
        cache.put(key("test2"), img(), 100).await;
        cache.put(key("test3"), img(), 100).await;

        // test1 should be evicted (LRU)
        assert!(cache.get(&key("test1")).await.is_none());
        assert!(cache.get(&key("test2")).await.is_some());
        assert!(cache.get(&key("test3")).await.is_some());
        assert_eq!(cache.resident_bytes().await, 200);
    }

    #[tokio::test]
    async fn test_get_promotes_entry() {
        let cache = MemoryImageCache::new(200);

        cache.put(key("test1"), img(), 100).await;
        cache.put(key("test2"), img(), 100).await;
        let _ = cache.get(&key("test1")).await;
        cache.put(key("test3"), img(), 100).await;

        assert!(cache.peek(&key("test1")).await.is_some());
        assert!(cache.peek(&key("test2")).await.is_none());
    }

    #[tokio::test]
    async fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(200);

        cache.put(key("test1"), img(), 100).await;
        cache.put(key("test2"), img(), 100).await;
        let _ = cache.peek(&key("test1")).await;
        cache.put(key("test3"), img(), 100).await;

        assert!(cache.peek(&key("test1")).await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_entry_is_not_cached() {
        let cache = MemoryImageCache::new(50);
        cache.put(key("big"), img(), 51).await;
        assert!(cache.is_empty());
        assert_eq!(cache.resident_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_replacing_entry_updates_accounting() {
        let cache = MemoryImageCache::new(1000);
        cache.put(key("a"), img(), 300).await;
        cache.put(key("a"), img(), 100).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.resident_bytes().await, 100);
    }

    #[tokio::test]
    async fn test_budget_holds_under_arbitrary_puts() {
        let cache = MemoryImageCache::new(1000);
        for i in 0..200_usize {
            let size = (i * 37) % 450 + 1;
            cache.put(key(&format!("k{}", i % 17)), img(), size).await;
            assert!(cache.resident_bytes().await <= cache.budget());
        }
    }

    #[tokio::test]
    async fn test_put_if_absent_keeps_first_value() {
        let cache = MemoryImageCache::new(1000);
        let first = Arc::new(DynamicImage::new_rgb8(1, 1));
        let second = Arc::new(DynamicImage::new_rgb8(2, 2));

        let kept = cache.put_if_absent(key("a"), first.clone(), 10).await;
        assert!(Arc::ptr_eq(&kept, &first));
        let kept = cache.put_if_absent(key("a"), second, 10).await;
        assert!(Arc::ptr_eq(&kept, &first));
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = MemoryImageCache::new(1000);
        cache.put(key("test1"), img(), 10).await;

        let _ = cache.get(&key("test1")).await;
        let _ = cache.get(&key("missing")).await;

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.resident_bytes, 10);
    }

    #[tokio::test]
    async fn test_evict_and_clear() {
        let cache = MemoryImageCache::new(1000);
        cache.put(key("a"), img(), 10).await;
        cache.put(key("b"), img(), 10).await;

        cache.evict(&key("a")).await;
        assert_eq!(cache.len(), 1);

        cache.clear().await;
        assert!(cache.is_empty());
        assert_eq!(cache.resident_bytes().await, 0);
    }
}
