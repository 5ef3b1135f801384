//! Pictor - an image loading pipeline.
//!
//! Resolves remote images through a coalescing fetch engine backed by a
//! byte-budgeted memory cache and a disk cache, applies transform chains,
//! and delivers results to display targets gated on their owner's liveness.
//! Full images can also be persisted to durable storage in the background.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the pipeline services.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing cache, network and config adapters.
pub mod infrastructure;

#[cfg(test)]
mod test_support;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "pictor";
