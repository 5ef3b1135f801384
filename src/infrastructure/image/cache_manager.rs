//! Owner of the memory and disk tiers.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use super::disk_cache::{DiskImageCache, default_cache_dir};
use super::memory_cache::{CacheStats, MemoryImageCache};
use crate::domain::ports::{CacheResult, ImageCachePort};

/// Sizing of both cache tiers.
#[derive(Debug, Clone)]
pub struct CacheManagerConfig {
    /// Byte budget of decoded images in memory.
    pub memory_bytes: usize,
    /// Byte budget of files on disk.
    pub disk_bytes: u64,
    /// Disk cache directory; the platform cache dir when unset.
    pub disk_dir: Option<PathBuf>,
}

/// Explicitly constructed cache pair shared by the fetch engine and the
/// persist service. Created once per session and torn down with it.
#[derive(Clone)]
pub struct CacheManager {
    memory: Arc<MemoryImageCache>,
    disk: Arc<DiskImageCache>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("disk_dir", &self.disk.dir())
            .field("memory_budget", &self.memory.budget())
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Opens both tiers.
    ///
    /// # Errors
    /// Returns error if the disk cache directory cannot be created or read.
    pub async fn open(config: &CacheManagerConfig) -> CacheResult<Self> {
        let dir = config.disk_dir.clone().unwrap_or_else(default_cache_dir);
        let disk = DiskImageCache::new(dir, config.disk_bytes).await?;
        info!(
            dir = %disk.dir().display(),
            memory_budget = config.memory_bytes,
            disk_budget = config.disk_bytes,
            "Image caches ready"
        );
        Ok(Self::from_parts(
            Arc::new(MemoryImageCache::new(config.memory_bytes)),
            Arc::new(disk),
        ))
    }

    /// Wraps already constructed tiers.
    #[must_use]
    pub const fn from_parts(memory: Arc<MemoryImageCache>, disk: Arc<DiskImageCache>) -> Self {
        Self { memory, disk }
    }

    /// The memory tier.
    #[must_use]
    pub fn memory(&self) -> &Arc<MemoryImageCache> {
        &self.memory
    }

    /// The disk tier.
    #[must_use]
    pub fn disk(&self) -> &Arc<DiskImageCache> {
        &self.disk
    }

    /// Returns memory cache statistics.
    pub async fn memory_stats(&self) -> CacheStats {
        self.memory.stats().await
    }

    /// Clears all caches.
    pub async fn clear_all(&self) {
        self.memory.clear().await;
        if let Err(e) = self.disk.clear().await {
            warn!(error = %e, "Failed to clear disk cache");
        }
        info!("Cleared all image caches");
    }
}
