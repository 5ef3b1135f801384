//! Shared fixtures for unit tests.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tempfile::TempDir;

use crate::application::services::{FetchEngine, FetchEngineConfig};
use crate::domain::ports::mocks::MockFetcher;
use crate::infrastructure::image::{CacheManager, DiskImageCache, ImageCrateCodec, MemoryImageCache};

/// Encodes an opaque RGBA gradient as PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 16) as u8, (y * 16) as u8, 128, 255])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Fetch engine over a temporary disk cache and a mock network.
pub struct TestEngine {
    pub engine: FetchEngine,
    pub caches: CacheManager,
    pub fetcher: Arc<MockFetcher>,
    _dir: TempDir,
}

impl TestEngine {
    pub async fn new(fetcher: MockFetcher) -> Self {
        Self::with_memory(fetcher, MemoryImageCache::new(64 * 1024 * 1024)).await
    }

    pub async fn with_memory(fetcher: MockFetcher, memory: MemoryImageCache) -> Self {
        let dir = TempDir::new().unwrap();
        let disk = DiskImageCache::new(dir.path().join("images"), 16 * 1024 * 1024)
            .await
            .unwrap();
        let caches = CacheManager::from_parts(Arc::new(memory), Arc::new(disk));
        let fetcher = Arc::new(fetcher);
        let engine = Self::engine_over(&caches, &fetcher);
        Self {
            engine,
            caches,
            fetcher,
            _dir: dir,
        }
    }

    /// A new engine sharing the disk tier and network, as after a process restart.
    pub fn restart_with_fresh_memory(&self) -> FetchEngine {
        let caches = CacheManager::from_parts(
            Arc::new(MemoryImageCache::new(64 * 1024 * 1024)),
            self.caches.disk().clone(),
        );
        Self::engine_over(&caches, &self.fetcher)
    }

    fn engine_over(caches: &CacheManager, fetcher: &Arc<MockFetcher>) -> FetchEngine {
        FetchEngine::new(
            caches.clone(),
            fetcher.clone(),
            Arc::new(ImageCrateCodec),
            FetchEngineConfig {
                max_concurrent_downloads: 4,
            },
        )
    }
}
