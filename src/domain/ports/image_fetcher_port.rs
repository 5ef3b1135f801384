//! Port definition for fetching remote image bytes.

use bytes::Bytes;

use crate::domain::errors::FetchError;

/// Raw bytes as returned by the remote side.
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    /// Response body.
    pub bytes: Bytes,
    /// `Content-Type` header, when the transport reports one.
    pub content_type: Option<String>,
}

/// Port for network fetches. Protocol details stay behind the implementation.
#[async_trait::async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetches the full body behind `url`.
    async fn fetch(&self, url: &str) -> Result<FetchedBytes, FetchError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::RwLock;

    /// In-memory fetcher serving registered bodies.
    #[derive(Default)]
    pub struct MockFetcher {
        bodies: RwLock<HashMap<String, FetchedBytes>>,
        calls: AtomicUsize,
        offline: AtomicBool,
        delay: Option<Duration>,
    }

    impl MockFetcher {
        /// Creates an empty fetcher.
        pub fn new() -> Self {
            Self::default()
        }

        /// Delays every fetch, keeping requests in flight for a while.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Registers a body for `url`.
        pub fn serve(&self, url: &str, bytes: Vec<u8>, content_type: Option<&str>) {
            self.bodies.write().insert(
                url.to_string(),
                FetchedBytes {
                    bytes: Bytes::from(bytes),
                    content_type: content_type.map(String::from),
                },
            );
        }

        /// Makes every subsequent fetch fail.
        pub fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }

        /// Number of fetches attempted.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ImageFetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedBytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.offline.load(Ordering::SeqCst) {
                return Err(FetchError::network("network disabled"));
            }
            self.bodies
                .read()
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::network(format!("HTTP 404 for {url}")))
        }
    }
}
