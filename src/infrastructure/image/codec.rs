//! `image` crate backed codec.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use crate::domain::errors::FetchError;
use crate::domain::ports::{CacheError, ImageCodec};

/// Decodes any format enabled on the `image` crate and stores resources as PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec;

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, FetchError> {
        image::load_from_memory(bytes)
            .map_err(|e| FetchError::decode(format!("Failed to decode image: {e}")))
    }

    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>, CacheError> {
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| CacheError::EncodeError(format!("Failed to encode PNG: {e}")))?;
        Ok(out.into_inner())
    }
}
