//! Port definition for the in-memory image tier.

use std::sync::Arc;

use image::DynamicImage;

use crate::domain::entities::CacheKey;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors raised by cache tiers. Always treated as a miss by the fetch engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// Cached bytes could not be decoded.
    #[error("Decode error: {0}")]
    DecodeError(String),
    /// Image could not be encoded for storage.
    #[error("Encode error: {0}")]
    EncodeError(String),
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
}

/// Port for a decoded-image cache.
/// Implementations must be thread-safe.
#[async_trait::async_trait]
pub trait ImageCachePort: Send + Sync {
    /// Attempts to get an image, promoting it to most recently used.
    async fn get(&self, key: &CacheKey) -> Option<Arc<DynamicImage>>;

    /// Stores an image accounted at `size_bytes`.
    async fn put(&self, key: CacheKey, image: Arc<DynamicImage>, size_bytes: usize);

    /// Removes an image from the cache.
    async fn evict(&self, key: &CacheKey);

    /// Returns the current number of cached images.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all images from the cache.
    async fn clear(&self);
}
