//! Persist task error types.

use thiserror::Error;

use super::FetchError;

/// Why a persist task did not produce a file.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum PersistError {
    #[error("download failed: {0}")]
    Network(#[from] FetchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("incomplete copy: wrote {written} of {expected} bytes")]
    Incomplete { expected: u64, written: u64 },

    #[error("persist task cancelled")]
    Cancelled,

    #[error("persist worker failed: {message}")]
    Worker { message: String },
}
