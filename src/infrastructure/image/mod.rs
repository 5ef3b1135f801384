//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with byte-budgeted LRU eviction
//! - Disk caching with atomic writes and LRU eviction
//! - HTTP fetching and `image` crate decoding

pub mod cache_manager;
pub mod codec;
pub mod disk_cache;
pub mod http_fetcher;
pub mod memory_cache;

pub use cache_manager::{CacheManager, CacheManagerConfig};
pub use codec::ImageCrateCodec;
pub use disk_cache::{DEFAULT_MAX_CACHE_SIZE, DiskImageCache, default_cache_dir};
pub use http_fetcher::HttpFetcher;
pub use memory_cache::{CacheStats, DEFAULT_MEMORY_BUDGET, MemoryImageCache};
