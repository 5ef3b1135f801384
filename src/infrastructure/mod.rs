//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Image handling (caching, fetching, decoding).
pub mod image;

pub use config::{AppConfig, CliArgs, Command, LogLevel, StorageManager};
pub use image::{
    CacheManager, CacheManagerConfig, CacheStats, DiskImageCache, HttpFetcher, ImageCrateCodec,
    MemoryImageCache,
};
