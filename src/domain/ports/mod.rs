//! Capability ports the pipeline depends on.

mod display_port;
mod image_cache_port;
mod image_codec_port;
mod image_fetcher_port;

pub use display_port::{
    AlwaysAlive, DisplayTarget, LivenessFlag, LivenessProbe, LoadListener, PersistListener,
};
pub use image_cache_port::{CacheError, CacheResult, ImageCachePort};
pub use image_codec_port::ImageCodec;
pub use image_fetcher_port::{FetchedBytes, ImageFetcher};

#[cfg(test)]
pub use display_port::MockDisplayTarget;
