//! Domain entity definitions.

mod cache_key;
mod image;
mod persist;
mod request;
mod transform;

pub use cache_key::{CacheKey, KeyKind};
pub use image::{ImageRef, ImageSource, LoadedImage, decoded_size_bytes};
pub use persist::PersistState;
pub use request::{CachePlan, DiskCacheStrategy, LoadRequest, LoadRequestBuilder, TargetSize};
pub use transform::{CornerMask, MAX_BLUR_SIGMA, Transform, dip_to_px};
