//! Image pipeline services.

pub mod fetch_engine;
pub mod persist_service;
pub mod request_coordinator;
pub mod transform_chain;

pub use fetch_engine::{FetchEngine, FetchEngineConfig};
pub use persist_service::{PersistConfig, PersistHandle, PersistService, default_persist_dir};
pub use request_coordinator::{LoadOutcome, RequestCoordinator};
pub use transform_chain::TransformChain;
