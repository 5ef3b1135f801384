//! Deterministic cache keys.

use std::fmt;

use sha2::{Digest, Sha256};

use super::request::{LoadRequest, TargetSize};
use super::transform::Transform;

const KEY_VERSION: &str = "pictor-key-v1";

/// Which form of an image a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Bytes exactly as fetched; depends on the url only.
    Source,
    /// The image after sizing and transforms.
    Resource,
}

impl KeyKind {
    const fn tag(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Resource => "resource",
        }
    }
}

/// Identifier for one cached form of an image.
///
/// Every input is length-prefixed before hashing, so no two distinct inputs
/// share a pre-image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: KeyKind,
    digest: String,
}

impl CacheKey {
    /// Builds the display key for a request's url, transform chain and size.
    #[must_use]
    pub fn build(url: &str, transforms: &[Transform], target_size: Option<TargetSize>) -> Self {
        let mut hasher = KeyHasher::new(KeyKind::Resource);
        hasher.field(url);
        hasher.field(&transforms.len().to_string());
        for transform in transforms {
            hasher.field(&transform.key_fragment());
        }
        match target_size {
            Some(size) => hasher.field(&size.to_string()),
            None => hasher.field("original"),
        }
        hasher.finish()
    }

    /// Builds the display key for a request.
    #[must_use]
    pub fn for_request(request: &LoadRequest) -> Self {
        Self::build(request.url(), request.transforms(), request.target_size())
    }

    /// Builds the key for the untransformed bytes behind `url`.
    #[must_use]
    pub fn source(url: &str) -> Self {
        let mut hasher = KeyHasher::new(KeyKind::Source);
        hasher.field(url);
        hasher.finish()
    }

    /// Form of the image this key addresses.
    #[must_use]
    pub const fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Hex digest, usable as a file stem.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digest)
    }
}

struct KeyHasher {
    kind: KeyKind,
    hasher: Sha256,
}

impl KeyHasher {
    fn new(kind: KeyKind) -> Self {
        let mut hasher = Self {
            kind,
            hasher: Sha256::new(),
        };
        hasher.field(KEY_VERSION);
        hasher.field(kind.tag());
        hasher
    }

    fn field(&mut self, value: &str) {
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
    }

    fn finish(self) -> CacheKey {
        CacheKey {
            kind: self.kind,
            digest: hex::encode(self.hasher.finalize()),
        }
    }
}
