//! HTTP implementation of the fetch port.

use std::time::Duration;

use tracing::debug;

use crate::domain::errors::FetchError;
use crate::domain::ports::{FetchedBytes, ImageFetcher};

/// Fetches image bytes with a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a per-request timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedBytes, FetchError> {
        debug!(url = %url, "Downloading image from network");
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::network(format!("Request timed out: {e}"))
            } else {
                FetchError::network(format!("Request failed: {e}"))
            }
        })?;

        if !response.status().is_success() {
            return Err(FetchError::network(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::network(format!("Failed to read body: {e}")))?;

        Ok(FetchedBytes {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        assert!(HttpFetcher::new(Duration::from_secs(5), "pictor-test").is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_is_network_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(5), "pictor-test").unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(err.is_network_error());
    }
}
