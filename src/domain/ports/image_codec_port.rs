//! Port definition for image decoding and resource encoding.

use image::DynamicImage;

use super::CacheError;
use crate::domain::errors::FetchError;

/// Black-box codec. Implementations are pure and may block; callers run
/// them off the async executor.
pub trait ImageCodec: Send + Sync {
    /// Decodes fetched or cached bytes.
    ///
    /// # Errors
    /// Returns a `Decode` fetch error if the bytes are not a supported image.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, FetchError>;

    /// Encodes a transformed image for the resource disk tier.
    ///
    /// # Errors
    /// Returns `CacheError::EncodeError` if encoding fails.
    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>, CacheError>;

    /// Sniffs the container format of raw bytes.
    fn guess_format(&self, bytes: &[u8]) -> Option<image::ImageFormat> {
        image::guess_format(bytes).ok()
    }
}
