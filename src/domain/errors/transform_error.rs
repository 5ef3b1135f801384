//! Transform error types.

use thiserror::Error;

/// Raised when a transform cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum TransformError {
    #[error("invalid {transform} parameter: {reason}")]
    InvalidParameter { transform: String, reason: String },

    #[error("{transform} unsupported: {reason}")]
    Unsupported { transform: String, reason: String },
}

impl TransformError {
    /// Creates an invalid parameter error.
    #[must_use]
    pub fn invalid(transform: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            transform: transform.into(),
            reason: reason.into(),
        }
    }
}
