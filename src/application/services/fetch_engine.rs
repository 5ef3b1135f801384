//! Resolves load requests through memory, disk and network.
//!
//! Concurrent misses for one cache key share a single network load: the
//! first caller spawns it and registers a shared future, later callers
//! await the same future and receive the same result.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use image::{DynamicImage, ImageFormat};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::transform_chain::TransformChain;
use crate::domain::entities::{
    CacheKey, DiskCacheStrategy, ImageSource, LoadRequest, LoadedImage, decoded_size_bytes,
};
use crate::domain::errors::FetchError;
use crate::domain::ports::{ImageCachePort, ImageCodec, ImageFetcher};
use crate::infrastructure::image::CacheManager;

type SharedLoad = Shared<BoxFuture<'static, Result<NetworkLoad, FetchError>>>;

/// Result of one network load, handed to every caller of the key.
///
/// Carries the fetched bytes so each caller can apply its own disk strategy.
#[derive(Clone)]
struct NetworkLoad {
    image: Arc<DynamicImage>,
    bytes: Bytes,
    format: Option<ImageFormat>,
}

/// Configuration for the fetch engine.
#[derive(Debug, Clone)]
pub struct FetchEngineConfig {
    /// Maximum concurrent network fetches.
    pub max_concurrent_downloads: usize,
}

impl Default for FetchEngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 4,
        }
    }
}

/// Three-tier image resolver: Memory -> Disk -> Network.
#[derive(Clone)]
pub struct FetchEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    caches: CacheManager,
    fetcher: Arc<dyn ImageFetcher>,
    codec: Arc<dyn ImageCodec>,
    downloads: Semaphore,
    in_flight: Mutex<HashMap<CacheKey, SharedLoad>>,
    config: FetchEngineConfig,
}

impl std::fmt::Debug for FetchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchEngine")
            .field("config", &self.inner.config)
            .field("caches", &self.inner.caches)
            .finish_non_exhaustive()
    }
}

impl FetchEngine {
    /// Creates an engine over the given caches and capabilities.
    #[must_use]
    pub fn new(
        caches: CacheManager,
        fetcher: Arc<dyn ImageFetcher>,
        codec: Arc<dyn ImageCodec>,
        config: FetchEngineConfig,
    ) -> Self {
        let permits = config.max_concurrent_downloads.max(1);
        Self {
            inner: Arc::new(EngineInner {
                caches,
                fetcher,
                codec,
                downloads: Semaphore::new(permits),
                in_flight: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    /// The caches this engine reads and populates.
    #[must_use]
    pub fn caches(&self) -> &CacheManager {
        &self.inner.caches
    }

    /// Number of network loads currently in flight.
    pub async fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().await.len()
    }

    /// Resolves a request to a decoded, transformed image.
    ///
    /// Cache tier failures are logged and treated as misses. Network, decode
    /// and transform failures are returned; nothing is retried.
    ///
    /// # Errors
    /// Returns `FetchError` if the image cannot be produced from any tier.
    pub async fn resolve(&self, request: &LoadRequest) -> Result<LoadedImage, FetchError> {
        let key = CacheKey::for_request(request);
        let memory = self.inner.caches.memory();

        if !request.skip_memory_cache()
            && let Some(image) = memory.get(&key).await
        {
            return Ok(LoadedImage {
                image,
                source: ImageSource::MemoryCache,
            });
        }

        if let Some(loaded) = self.inner.load_from_disk(request, &key).await? {
            let image = if request.skip_memory_cache() {
                loaded.image
            } else {
                let size = decoded_size_bytes(&loaded.image);
                memory.put_if_absent(key.clone(), loaded.image, size).await
            };
            return Ok(LoadedImage {
                image,
                source: loaded.source,
            });
        }

        let (load, joined) = {
            let mut in_flight = self.inner.in_flight.lock().await;
            if !request.skip_memory_cache()
                && let Some(image) = memory.peek(&key).await
            {
                return Ok(LoadedImage {
                    image,
                    source: ImageSource::MemoryCache,
                });
            }
            if let Some(existing) = in_flight.get(&key) {
                debug!(key = %key, url = %request.url(), "Joining in-flight load");
                (existing.clone(), true)
            } else {
                let load = self.start_network_load(request, &key);
                in_flight.insert(key.clone(), load.clone());
                (load, false)
            }
        };

        let load = load.await?;
        if !joined {
            return Ok(LoadedImage {
                image: load.image,
                source: ImageSource::Network,
            });
        }

        self.inner.store_fetched(request, &key, &load).await;
        let image = if request.skip_memory_cache() {
            load.image
        } else {
            let size = decoded_size_bytes(&load.image);
            memory.put_if_absent(key, load.image, size).await
        };

        Ok(LoadedImage {
            image,
            source: ImageSource::Network,
        })
    }

    /// Resolves a request in the background, only warming the caches.
    pub fn preload(&self, request: LoadRequest) -> JoinHandle<Result<LoadedImage, FetchError>> {
        let engine = self.clone();
        tokio::spawn(async move {
            let result = engine.resolve(&request).await;
            if let Err(e) = &result {
                debug!(url = %request.url(), error = %e, "Preload failed");
            }
            result
        })
    }

    fn start_network_load(&self, request: &LoadRequest, key: &CacheKey) -> SharedLoad {
        let inner = self.inner.clone();
        let request = request.clone();
        let key = key.clone();

        let task = tokio::spawn(async move {
            let result = AssertUnwindSafe(inner.load_from_network(&request, &key))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(FetchError::internal("network load panicked")));

            inner.in_flight.lock().await.remove(&key);
            match &result {
                Ok(_) => debug!(key = %key, url = %request.url(), "Network load complete"),
                Err(e) => debug!(key = %key, url = %request.url(), error = %e, "Network load failed"),
            }
            result
        });

        task.map(|joined| {
            joined.unwrap_or_else(|e| Err(FetchError::internal(format!("Fetch task failed: {e}"))))
        })
        .boxed()
        .shared()
    }
}

impl EngineInner {
    /// Consults the disk tiers allowed by the request's strategy.
    ///
    /// Only transform failures on cached source bytes are returned as errors.
    async fn load_from_disk(
        &self,
        request: &LoadRequest,
        key: &CacheKey,
    ) -> Result<Option<LoadedImage>, FetchError> {
        let plan = request.disk_cache_strategy().read_plan();

        if plan.resource
            && let Some(bytes) = self.read_disk(key).await
        {
            match self.decode(bytes).await {
                Ok(image) => {
                    trace!(key = %key, "Resolved from resource disk cache");
                    return Ok(Some(LoadedImage {
                        image: Arc::new(image),
                        source: ImageSource::ResourceDiskCache,
                    }));
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Corrupt resource cache entry, evicting");
                    self.caches.disk().evict(key).await;
                }
            }
        }

        if !plan.data {
            return Ok(None);
        }
        let source_key = CacheKey::source(request.url());
        let Some(bytes) = self.read_disk(&source_key).await else {
            return Ok(None);
        };

        let decoded = match self.decode(bytes).await {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(key = %source_key, error = %e, "Corrupt data cache entry, evicting");
                self.caches.disk().evict(&source_key).await;
                return Ok(None);
            }
        };
        let image = Arc::new(self.transform(decoded, request).await?);
        trace!(key = %source_key, "Resolved from data disk cache");

        if request.is_transformed() && request.disk_cache_strategy() == DiskCacheStrategy::All {
            self.store_resource(key, &image).await;
        }
        Ok(Some(LoadedImage {
            image,
            source: ImageSource::DataDiskCache,
        }))
    }

    async fn load_from_network(
        &self,
        request: &LoadRequest,
        key: &CacheKey,
    ) -> Result<NetworkLoad, FetchError> {
        let fetched = {
            let _permit = self
                .downloads
                .acquire()
                .await
                .map_err(|e| FetchError::internal(format!("Download limiter closed: {e}")))?;
            self.fetcher.fetch(request.url()).await?
        };

        let format = self.codec.guess_format(&fetched.bytes);
        let decoded = self.decode(fetched.bytes.to_vec()).await?;
        let image = Arc::new(self.transform(decoded, request).await?);

        let mut load = NetworkLoad {
            image,
            bytes: fetched.bytes,
            format,
        };
        self.store_fetched(request, key, &load).await;

        if !request.skip_memory_cache() {
            let size = decoded_size_bytes(&load.image);
            load.image = self
                .caches
                .memory()
                .put_if_absent(key.clone(), load.image, size)
                .await;
        }
        Ok(load)
    }

    /// Writes a network result to the disk tiers `request`'s strategy selects.
    async fn store_fetched(&self, request: &LoadRequest, key: &CacheKey, load: &NetworkLoad) {
        let plan = request
            .disk_cache_strategy()
            .write_plan(load.format, request.is_transformed());
        if plan.data {
            self.store_data(request.url(), &load.bytes).await;
        }
        if plan.resource {
            self.store_resource(key, &load.image).await;
        }
    }

    async fn read_disk(&self, key: &CacheKey) -> Option<Vec<u8>> {
        match self.caches.disk().get_bytes(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Disk cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store_data(&self, url: &str, bytes: &[u8]) {
        let key = CacheKey::source(url);
        if self.caches.disk().contains(&key).await {
            return;
        }
        if let Err(e) = self.caches.disk().put_bytes(&key, bytes).await {
            warn!(key = %key, error = %e, "Failed to cache source bytes");
        }
    }

    async fn store_resource(&self, key: &CacheKey, image: &Arc<DynamicImage>) {
        if self.caches.disk().contains(key).await {
            return;
        }
        let codec = self.codec.clone();
        let image = image.clone();
        let encoded = tokio::task::spawn_blocking(move || codec.encode(&image)).await;
        let bytes = match encoded {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Failed to encode resource");
                return;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Encode task failed");
                return;
            }
        };
        if let Err(e) = self.caches.disk().put_bytes(key, &bytes).await {
            warn!(key = %key, error = %e, "Failed to cache resource bytes");
        }
    }

    async fn decode(&self, bytes: Vec<u8>) -> Result<DynamicImage, FetchError> {
        let codec = self.codec.clone();
        run_blocking(move || codec.decode(&bytes)).await
    }

    async fn transform(
        &self,
        decoded: DynamicImage,
        request: &LoadRequest,
    ) -> Result<DynamicImage, FetchError> {
        if !request.is_transformed() {
            return Ok(decoded);
        }
        let request = request.clone();
        run_blocking(move || {
            TransformChain::apply(&decoded, request.transforms(), request.target_size())
                .map_err(FetchError::from)
        })
        .await
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, FetchError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, FetchError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| FetchError::internal(format!("Worker task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::future::join_all;
    use image::GenericImageView;

    use super::*;
    use crate::domain::entities::Transform;
    use crate::domain::errors::FetchErrorKind;
    use crate::domain::ports::mocks::MockFetcher;
    use crate::infrastructure::image::MemoryImageCache;
    use crate::test_support::{TestEngine, png_bytes};

    const URL: &str = "https://example.com/a.jpg";

    fn request(strategy: DiskCacheStrategy) -> LoadRequest {
        LoadRequest::builder(URL).disk_cache_strategy(strategy).build()
    }

    #[tokio::test]
    async fn test_second_resolve_served_from_memory() {
        let env = TestEngine::new(MockFetcher::new()).await;
        env.fetcher.serve(URL, png_bytes(8, 8), Some("image/png"));
        let req = request(DiskCacheStrategy::None);

        let first = env.engine.resolve(&req).await.unwrap();
        let second = env.engine.resolve(&req).await.unwrap();

        assert_eq!(first.source, ImageSource::Network);
        assert_eq!(second.source, ImageSource::MemoryCache);
        assert!(Arc::ptr_eq(&first.image, &second.image));
        assert_eq!(env.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_coalesce() {
        let env = TestEngine::new(MockFetcher::new().with_delay(Duration::from_millis(50))).await;
        env.fetcher.serve(URL, png_bytes(8, 8), None);
        let req = request(DiskCacheStrategy::All);

        let results = join_all((0..8).map(|_| env.engine.resolve(&req))).await;

        assert_eq!(env.fetcher.calls(), 1);
        let images: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        for loaded in &images {
            assert!(Arc::ptr_eq(&loaded.image, &images[0].image));
        }
        assert_eq!(env.engine.in_flight_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_failure() {
        let env = TestEngine::new(MockFetcher::new().with_delay(Duration::from_millis(50))).await;
        env.fetcher.go_offline();
        let req = request(DiskCacheStrategy::All);

        let results = join_all((0..4).map(|_| env.engine.resolve(&req))).await;

        assert_eq!(env.fetcher.calls(), 1);
        for result in results {
            let err = result.unwrap_err();
            assert_eq!(err.kind, FetchErrorKind::Network);
        }
        assert_eq!(env.engine.in_flight_count().await, 0);
    }

    #[tokio::test]
    async fn test_joiner_applies_its_own_disk_strategy() {
        let env = TestEngine::new(MockFetcher::new().with_delay(Duration::from_millis(50))).await;
        env.fetcher.serve(URL, png_bytes(8, 8), None);
        let uncached = request(DiskCacheStrategy::None);
        let cached = request(DiskCacheStrategy::All);

        let (first, second) = tokio::join!(
            env.engine.resolve(&uncached),
            env.engine.resolve(&cached)
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(env.fetcher.calls(), 1);
        assert!(env.caches.disk().contains(&CacheKey::source(URL)).await);

        env.fetcher.go_offline();
        let loaded = env.restart_with_fresh_memory().resolve(&cached).await.unwrap();
        assert_eq!(loaded.source, ImageSource::ResourceDiskCache);
    }

    #[tokio::test]
    async fn test_distinct_keys_load_in_parallel() {
        let env = TestEngine::new(MockFetcher::new().with_delay(Duration::from_millis(300))).await;
        env.fetcher.serve(URL, png_bytes(4, 4), None);
        env.fetcher.serve("https://example.com/b.jpg", png_bytes(4, 4), None);

        let a = env.engine.preload(request(DiskCacheStrategy::None));
        let b = env.engine.preload(
            LoadRequest::builder("https://example.com/b.jpg")
                .disk_cache_strategy(DiskCacheStrategy::None)
                .build(),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(env.engine.in_flight_count().await, 2);

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(env.fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_all_strategy_survives_offline() {
        let env = TestEngine::new(MockFetcher::new()).await;
        env.fetcher.serve(URL, png_bytes(8, 8), None);
        let req = LoadRequest::builder(URL)
            .transform(Transform::Grayscale)
            .disk_cache_strategy(DiskCacheStrategy::All)
            .build();

        env.engine.resolve(&req).await.unwrap();
        assert!(env.caches.disk().contains(&CacheKey::source(URL)).await);
        assert!(env.caches.disk().contains(&CacheKey::for_request(&req)).await);

        env.fetcher.go_offline();
        let restarted = env.restart_with_fresh_memory();
        let loaded = restarted.resolve(&req).await.unwrap();
        assert_eq!(loaded.source, ImageSource::ResourceDiskCache);
        assert_eq!(env.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_circle_crop_resource_served_from_disk() {
        let env = TestEngine::new(MockFetcher::new()).await;
        env.fetcher.serve(URL, png_bytes(16, 12), Some("image/jpeg"));
        let req = LoadRequest::builder(URL)
            .transform(Transform::CircleCrop)
            .disk_cache_strategy(DiskCacheStrategy::Resource)
            .build();

        let first = env.engine.resolve(&req).await.unwrap();
        assert_eq!(first.source, ImageSource::Network);
        assert!(!env.caches.disk().contains(&CacheKey::source(URL)).await);

        env.fetcher.go_offline();
        env.caches.memory().clear().await;
        let second = env.engine.resolve(&req).await.unwrap();

        assert_eq!(second.source, ImageSource::ResourceDiskCache);
        assert_eq!(second.image.dimensions(), (12, 12));
        assert_eq!(
            second.image.to_rgba8().into_raw(),
            first.image.to_rgba8().into_raw()
        );
    }

    #[tokio::test]
    async fn test_data_strategy_reapplies_transforms() {
        let env = TestEngine::new(MockFetcher::new()).await;
        env.fetcher.serve(URL, png_bytes(16, 12), None);
        let req = LoadRequest::builder(URL)
            .transform(Transform::CircleCrop)
            .disk_cache_strategy(DiskCacheStrategy::Data)
            .build();

        env.engine.resolve(&req).await.unwrap();
        assert!(env.caches.disk().contains(&CacheKey::source(URL)).await);
        assert!(!env.caches.disk().contains(&CacheKey::for_request(&req)).await);

        env.fetcher.go_offline();
        let loaded = env.restart_with_fresh_memory().resolve(&req).await.unwrap();
        assert_eq!(loaded.source, ImageSource::DataDiskCache);
        assert_eq!(loaded.image.dimensions(), (12, 12));
    }

    #[tokio::test]
    async fn test_none_strategy_never_touches_disk() {
        let env = TestEngine::new(MockFetcher::new()).await;
        env.fetcher.serve(URL, png_bytes(8, 8), None);

        env.engine
            .resolve(&request(DiskCacheStrategy::None))
            .await
            .unwrap();
        assert!(env.caches.disk().is_empty());
    }

    #[tokio::test]
    async fn test_automatic_keeps_source_for_untransformed() {
        let env = TestEngine::new(MockFetcher::new()).await;
        env.fetcher.serve(URL, png_bytes(8, 8), None);
        let req = request(DiskCacheStrategy::Automatic);

        env.engine.resolve(&req).await.unwrap();
        assert!(env.caches.disk().contains(&CacheKey::source(URL)).await);
        assert!(!env.caches.disk().contains(&CacheKey::for_request(&req)).await);
    }

    #[tokio::test]
    async fn test_skip_memory_cache_never_populates_memory() {
        let env = TestEngine::new(MockFetcher::new()).await;
        env.fetcher.serve(URL, png_bytes(8, 8), None);
        let req = LoadRequest::builder(URL)
            .disk_cache_strategy(DiskCacheStrategy::All)
            .skip_memory_cache(true)
            .build();
        let key = CacheKey::for_request(&req);

        for _ in 0..3 {
            env.engine.resolve(&req).await.unwrap();
            assert!(env.caches.memory().peek(&key).await.is_none());
        }
        assert!(env.caches.memory().is_empty());
    }

    #[tokio::test]
    async fn test_decode_failure_is_reported() {
        let env = TestEngine::new(MockFetcher::new()).await;
        env.fetcher.serve(URL, b"<html>not found</html>".to_vec(), None);

        let err = env
            .engine
            .resolve(&request(DiskCacheStrategy::All))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Decode);
        assert!(env.caches.memory().is_empty());
    }

    #[tokio::test]
    async fn test_transform_failure_is_reported() {
        let env = TestEngine::new(MockFetcher::new()).await;
        env.fetcher.serve(URL, png_bytes(8, 8), None);
        let req = LoadRequest::builder(URL)
            .transform(Transform::rounded(40))
            .build();

        let err = env.engine.resolve(&req).await.unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::Transform);
    }

    #[tokio::test]
    async fn test_corrupt_disk_entry_falls_back_to_network() {
        let env = TestEngine::new(MockFetcher::new()).await;
        env.fetcher.serve(URL, png_bytes(8, 8), None);
        let req = request(DiskCacheStrategy::Resource);
        env.caches
            .disk()
            .put_bytes(&CacheKey::for_request(&req), b"garbage")
            .await
            .unwrap();

        let loaded = env.engine.resolve(&req).await.unwrap();
        assert_eq!(loaded.source, ImageSource::Network);
        assert_eq!(env.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_memory_budget_respected_by_engine() {
        let env = TestEngine::with_memory(MockFetcher::new(), MemoryImageCache::new(300)).await;
        for i in 0..5 {
            let url = format!("https://example.com/{i}.png");
            env.fetcher.serve(&url, png_bytes(8, 8), None);
            env.engine
                .resolve(
                    &LoadRequest::builder(url)
                        .disk_cache_strategy(DiskCacheStrategy::None)
                        .build(),
                )
                .await
                .unwrap();
            assert!(env.caches.memory().resident_bytes().await <= 300);
        }
    }
}
