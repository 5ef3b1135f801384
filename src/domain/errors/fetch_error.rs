//! Fetch pipeline error types.

use std::fmt;

use thiserror::Error;

use super::TransformError;

/// Stage of the pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// The network fetch failed or timed out.
    Network,
    /// The fetched bytes are not a decodable image.
    Decode,
    /// A transform rejected its parameters or failed.
    Transform,
    /// A worker task panicked or was aborted.
    Internal,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Decode => write!(f, "decode"),
            Self::Transform => write!(f, "transform"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Failure of a single resolve.
///
/// Cloneable so one coalesced result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {cause}")]
pub struct FetchError {
    /// Failing stage.
    pub kind: FetchErrorKind,
    /// Human-readable cause.
    pub cause: String,
}

impl FetchError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: FetchErrorKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(cause: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, cause)
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(cause: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Decode, cause)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(cause: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Internal, cause)
    }

    /// Returns whether error is network related.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Network)
    }
}

impl From<TransformError> for FetchError {
    fn from(err: TransformError) -> Self {
        Self::new(FetchErrorKind::Transform, err.to_string())
    }
}
