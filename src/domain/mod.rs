//! Domain layer with core entities, errors and capability ports.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheKey, DiskCacheStrategy, LoadRequest, Transform};
pub use errors::{FetchError, FetchErrorKind};
