//! Domain error types.

mod fetch_error;
mod persist_error;
mod transform_error;

pub use fetch_error::{FetchError, FetchErrorKind};
pub use persist_error::PersistError;
pub use transform_error::TransformError;
