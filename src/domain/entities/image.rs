//! Domain types for decoded images.

use std::sync::Arc;

use image::{DynamicImage, Rgba, RgbaImage};

/// A stand-in image shown by a display target: a placeholder or error fallback.
#[derive(Debug, Clone, Default)]
pub enum ImageRef {
    /// Nothing to show; the target is cleared.
    #[default]
    None,
    /// A solid RGBA color filling the target.
    Color([u8; 4]),
    /// A ready decoded image.
    Image(Arc<DynamicImage>),
}

impl ImageRef {
    /// Returns true if there is nothing to show.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Renders the reference at the given size.
    ///
    /// Decoded images are returned as-is; colors are expanded to a filled image.
    #[must_use]
    pub fn render(&self, width: u32, height: u32) -> Option<Arc<DynamicImage>> {
        match self {
            Self::None => None,
            Self::Color(rgba) => Some(Arc::new(DynamicImage::ImageRgba8(
                RgbaImage::from_pixel(width.max(1), height.max(1), Rgba(*rgba)),
            ))),
            Self::Image(img) => Some(img.clone()),
        }
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from the in-memory LRU cache.
    MemoryCache,
    /// Decoded from transformed bytes in the disk cache.
    ResourceDiskCache,
    /// Decoded from source bytes in the disk cache, then transformed.
    DataDiskCache,
    /// Downloaded from the network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::ResourceDiskCache => write!(f, "disk-resource"),
            Self::DataDiskCache => write!(f, "disk-data"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A decoded, transformed image ready for display.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// The image handle, shared with the memory cache.
    pub image: Arc<DynamicImage>,
    /// Tier that produced the image.
    pub source: ImageSource,
}

/// Approximate resident size of a decoded image.
#[must_use]
pub fn decoded_size_bytes(image: &DynamicImage) -> usize {
    image.as_bytes().len()
}
