//! Disk-based image cache for persistence across sessions.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::ports::{CacheError, CacheResult};

/// Maximum disk cache size in bytes (250 MB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 250 * 1024 * 1024;

const ENTRY_EXTENSION: &str = "img";
const TEMP_PREFIX: &str = ".pending-";

/// Recency order of the files on disk, most recently used last.
struct DiskIndex {
    entries: LruCache<String, u64>,
    total_size: u64,
}

impl DiskIndex {
    fn record(&mut self, stem: String, size: u64) {
        if let Some(old) = self.entries.put(stem, size) {
            self.total_size -= old;
        }
        self.total_size += size;
    }

    /// Marks `stem` most recently used if it is indexed.
    fn touch(&mut self, stem: &str) {
        self.entries.get(stem);
    }

    fn forget(&mut self, stem: &str) -> Option<u64> {
        let size = self.entries.pop(stem)?;
        self.total_size -= size;
        Some(size)
    }

    /// Pops LRU entries until the index fits `max_size`.
    fn overflow(&mut self, max_size: u64) -> Vec<(String, u64)> {
        let mut victims = Vec::new();
        while self.total_size > max_size {
            let Some((stem, size)) = self.entries.pop_lru() else {
                break;
            };
            self.total_size -= size;
            victims.push((stem, size));
        }
        victims
    }
}

/// Disk-based cache of raw and transformed image bytes.
///
/// Writes land in a temporary file that is renamed into place, so readers
/// see either the previous entry or the complete new one. The rename and the
/// index update happen under the index lock, as do eviction's pop and delete.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    max_size: u64,
    index: Arc<Mutex<DiskIndex>>,
}

impl DiskImageCache {
    /// Creates a new disk cache in the specified directory.
    ///
    /// Existing entries are indexed oldest-modified first; leftovers of
    /// interrupted writes are removed.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created or read.
    pub async fn new(cache_dir: PathBuf, max_size: u64) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to create cache dir: {e}")))?;

        let mut entries = fs::read_dir(&cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read cache dir: {e}")))?;

        let mut files: Vec<(String, SystemTime, u64)> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(TEMP_PREFIX));
            if is_temp {
                if let Err(e) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to remove stale temp file");
                }
                continue;
            }
            if path.extension().is_none_or(|ext| ext != ENTRY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            if let Ok(meta) = entry.metadata().await {
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                files.push((stem, modified, meta.len()));
            }
        }
        files.sort_by_key(|(_, modified, _)| *modified);

        let mut index = DiskIndex {
            entries: LruCache::unbounded(),
            total_size: 0,
        };
        for (stem, _, size) in files {
            index.record(stem, size);
        }
        debug!(
            dir = %cache_dir.display(),
            entries = index.entries.len(),
            size = index.total_size,
            "Opened disk cache"
        );

        let cache = Self {
            cache_dir,
            max_size,
            index: Arc::new(Mutex::new(index)),
        };
        cache.cleanup_if_needed().await;
        Ok(cache)
    }

    /// Creates a cache in the default location.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn default_location() -> CacheResult<Self> {
        Self::new(default_cache_dir(), DEFAULT_MAX_CACHE_SIZE).await
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Configured size budget in bytes.
    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    fn cache_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{ENTRY_EXTENSION}", key.as_str()))
    }

    /// Gets bytes stored under `key`, marking the entry most recently used.
    ///
    /// # Errors
    /// Returns error on I/O failures other than a missing entry.
    pub async fn get_bytes(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        let path = self.cache_path(key);
        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(key = %key, path = %path.display(), "Disk cache hit");
                self.index.lock().touch(key.as_str());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(key = %key, "Disk cache miss");
                self.index.lock().forget(key.as_str());
                Ok(None)
            }
            Err(e) => Err(CacheError::IoError(format!(
                "Failed to read cache file: {e}"
            ))),
        }
    }

    /// Stores bytes under `key`, replacing any previous entry atomically.
    ///
    /// # Errors
    /// Returns error if the temporary file cannot be written or renamed.
    pub async fn put_bytes(&self, key: &CacheKey, bytes: &[u8]) -> CacheResult<()> {
        let size = bytes.len() as u64;
        if size > self.max_size {
            debug!(key = %key, size, max_size = self.max_size, "Entry exceeds disk budget, not caching");
            return Ok(());
        }

        let dir = self.cache_dir.clone();
        let path = self.cache_path(key);
        let data = bytes.to_vec();
        let target = path.clone();
        let index = Arc::clone(&self.index);
        let stem = key.as_str().to_string();
        tokio::task::spawn_blocking(move || {
            let temp = stage_entry(&dir, &data)?;
            let mut index = index.lock();
            temp.persist(&target).map_err(|e| {
                CacheError::IoError(format!("Failed to commit cache file: {}", e.error))
            })?;
            index.record(stem, size);
            Ok::<_, CacheError>(())
        })
        .await
        .map_err(|e| CacheError::IoError(format!("Cache write task failed: {e}")))??;

        debug!(key = %key, path = %path.display(), size, "Stored image in disk cache");

        self.cleanup_if_needed().await;
        Ok(())
    }

    /// Checks if an entry exists.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        fs::try_exists(self.cache_path(key)).await.unwrap_or(false)
    }

    /// Removes an entry from disk cache.
    pub async fn evict(&self, key: &CacheKey) {
        let path = self.cache_path(key);
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(key = %key, error = %e, "Failed to evict from disk cache");
                return;
            }
        } else {
            debug!(key = %key, "Evicted from disk cache");
        }
        self.index.lock().forget(key.as_str());
    }

    /// Clears the entire disk cache.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be read.
    pub async fn clear(&self) -> CacheResult<()> {
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read cache dir: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read entry: {e}")))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
                && fs::remove_file(&path).await.is_err()
            {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }
        let mut index = self.index.lock();
        index.entries.clear();
        index.total_size = 0;
        debug!("Cleared disk cache");
        Ok(())
    }

    /// Returns the current cache size in bytes.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.index.lock().total_size
    }

    /// Returns the number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.lock().entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes least recently used entries while over the size limit.
    async fn cleanup_if_needed(&self) {
        if self.index.lock().total_size <= self.max_size {
            return;
        }

        let index = Arc::clone(&self.index);
        let dir = self.cache_dir.clone();
        let max_size = self.max_size;
        let swept = tokio::task::spawn_blocking(move || {
            let mut index = index.lock();
            let victims = index.overflow(max_size);
            let mut freed_size = 0u64;
            for (stem, size) in &victims {
                let path = dir.join(format!("{stem}.{ENTRY_EXTENSION}"));
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        trace!(path = %path.display(), "Removed old cache file");
                        freed_size += size;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove old cache file"),
                }
            }
            (victims.len(), freed_size)
        })
        .await;

        match swept {
            Ok((freed_count, freed_size)) => debug!(
                freed_size,
                freed_count,
                max_size = self.max_size,
                "Disk cache cleanup complete"
            ),
            Err(e) => warn!(error = %e, "Disk cache cleanup task failed"),
        }
    }
}

/// Writes `bytes` to a synced temporary file in `dir`.
fn stage_entry(dir: &Path, bytes: &[u8]) -> CacheResult<tempfile::NamedTempFile> {
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| CacheError::IoError(format!("Failed to create cache file: {e}")))?;
    temp.write_all(bytes)
        .map_err(|e| CacheError::IoError(format!("Failed to write cache file: {e}")))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| CacheError::IoError(format!("Failed to flush cache file: {e}")))?;
    Ok(temp)
}

/// Returns the default cache directory path.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "linuxmobile", "pictor").map_or_else(
        || std::env::temp_dir().join("pictor").join("cache").join("images"),
        |dirs| dirs.cache_dir().join("images"),
    )
}
