//! Load requests and their cache options.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::image::ImageRef;
use super::transform::Transform;
use crate::domain::errors::TransformError;

/// Requested output dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl TargetSize {
    /// Creates a target size.
    ///
    /// # Errors
    /// Returns `TransformError::InvalidParameter` if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Result<Self, TransformError> {
        if width == 0 || height == 0 {
            return Err(TransformError::invalid(
                "target_size",
                format!("{width}x{height} has a zero dimension"),
            ));
        }
        Ok(Self { width, height })
    }

    /// Shorter side of the target.
    #[must_use]
    pub fn min_side(self) -> u32 {
        self.width.min(self.height)
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for TargetSize {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| TransformError::invalid("target_size", "expected WIDTHxHEIGHT"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| TransformError::invalid("target_size", e.to_string()))
        };
        Self::new(parse(w)?, parse(h)?)
    }
}

/// Controls which byte forms of an image are written to the disk cache.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DiskCacheStrategy {
    /// Never read or write the disk cache.
    None,
    /// Cache the bytes as fetched from the network.
    Data,
    /// Cache the bytes of the transformed image.
    Resource,
    /// Cache both forms.
    All,
    /// Pick `Data` or `Resource` per image.
    #[default]
    Automatic,
}

/// Where a request may read from or write to on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePlan {
    /// Source bytes under the url-only key.
    pub data: bool,
    /// Transformed bytes under the full request key.
    pub resource: bool,
}

impl DiskCacheStrategy {
    /// Tiers consulted on lookup, before the fetched content is known.
    #[must_use]
    pub const fn read_plan(self) -> CachePlan {
        match self {
            Self::None => CachePlan {
                data: false,
                resource: false,
            },
            Self::Data => CachePlan {
                data: true,
                resource: false,
            },
            Self::Resource => CachePlan {
                data: false,
                resource: true,
            },
            Self::All | Self::Automatic => CachePlan {
                data: true,
                resource: true,
            },
        }
    }

    /// Tiers written after a network fetch.
    ///
    /// `Automatic` keeps the source bytes when re-encoding gains nothing:
    /// the request is untransformed, or the content is GIF, which would lose
    /// its animation and usually grow once re-encoded. Everything else is
    /// stored transformed.
    #[must_use]
    pub fn write_plan(self, format: Option<image::ImageFormat>, transformed: bool) -> CachePlan {
        match self {
            Self::Automatic => {
                let keep_source = !transformed || format == Some(image::ImageFormat::Gif);
                CachePlan {
                    data: keep_source,
                    resource: !keep_source,
                }
            }
            other => other.read_plan(),
        }
    }
}

impl fmt::Display for DiskCacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Data => write!(f, "data"),
            Self::Resource => write!(f, "resource"),
            Self::All => write!(f, "all"),
            Self::Automatic => write!(f, "automatic"),
        }
    }
}

/// An immutable request to load one image.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    url: String,
    placeholder: ImageRef,
    error_fallback: ImageRef,
    transforms: Arc<[Transform]>,
    target_size: Option<TargetSize>,
    disk_cache_strategy: DiskCacheStrategy,
    skip_memory_cache: bool,
}

impl LoadRequest {
    /// Starts building a request for `url`.
    #[must_use]
    pub fn builder(url: impl Into<String>) -> LoadRequestBuilder {
        LoadRequestBuilder {
            url: url.into(),
            placeholder: ImageRef::None,
            error_fallback: ImageRef::None,
            transforms: Vec::new(),
            target_size: None,
            disk_cache_strategy: DiskCacheStrategy::default(),
            skip_memory_cache: false,
        }
    }

    /// Remote location of the image.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Shown while the image loads.
    #[must_use]
    pub const fn placeholder(&self) -> &ImageRef {
        &self.placeholder
    }

    /// Shown when the load fails.
    #[must_use]
    pub const fn error_fallback(&self) -> &ImageRef {
        &self.error_fallback
    }

    /// Ordered transform chain.
    #[must_use]
    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    /// Requested output size, if any.
    #[must_use]
    pub const fn target_size(&self) -> Option<TargetSize> {
        self.target_size
    }

    /// Disk cache strategy.
    #[must_use]
    pub const fn disk_cache_strategy(&self) -> DiskCacheStrategy {
        self.disk_cache_strategy
    }

    /// Whether the memory tier is bypassed for this request.
    #[must_use]
    pub const fn skip_memory_cache(&self) -> bool {
        self.skip_memory_cache
    }

    /// True when the decoded source must be altered before display.
    #[must_use]
    pub fn is_transformed(&self) -> bool {
        !self.transforms.is_empty() || self.target_size.is_some()
    }
}

/// Builder for [`LoadRequest`].
#[derive(Debug, Clone)]
pub struct LoadRequestBuilder {
    url: String,
    placeholder: ImageRef,
    error_fallback: ImageRef,
    transforms: Vec<Transform>,
    target_size: Option<TargetSize>,
    disk_cache_strategy: DiskCacheStrategy,
    skip_memory_cache: bool,
}

impl LoadRequestBuilder {
    /// Sets the placeholder image.
    #[must_use]
    pub fn placeholder(mut self, placeholder: ImageRef) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Sets the error fallback image.
    #[must_use]
    pub fn error_fallback(mut self, error_fallback: ImageRef) -> Self {
        self.error_fallback = error_fallback;
        self
    }

    /// Appends a transform to the chain.
    #[must_use]
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Appends several transforms to the chain, in order.
    #[must_use]
    pub fn transforms(mut self, transforms: impl IntoIterator<Item = Transform>) -> Self {
        self.transforms.extend(transforms);
        self
    }

    /// Sets the target size.
    #[must_use]
    pub const fn target_size(mut self, size: TargetSize) -> Self {
        self.target_size = Some(size);
        self
    }

    /// Sets the disk cache strategy.
    #[must_use]
    pub const fn disk_cache_strategy(mut self, strategy: DiskCacheStrategy) -> Self {
        self.disk_cache_strategy = strategy;
        self
    }

    /// Bypasses the memory tier for reads and writes.
    #[must_use]
    pub const fn skip_memory_cache(mut self, skip: bool) -> Self {
        self.skip_memory_cache = skip;
        self
    }

    /// Finalizes the request.
    #[must_use]
    pub fn build(self) -> LoadRequest {
        LoadRequest {
            url: self.url,
            placeholder: self.placeholder,
            error_fallback: self.error_fallback,
            transforms: self.transforms.into(),
            target_size: self.target_size,
            disk_cache_strategy: self.disk_cache_strategy,
            skip_memory_cache: self.skip_memory_cache,
        }
    }
}
