//! Application layer: the load pipeline and background persistence.

/// Pipeline services.
pub mod services;

pub use services::{
    FetchEngine, FetchEngineConfig, LoadOutcome, PersistConfig, PersistHandle, PersistService,
    RequestCoordinator, TransformChain,
};
