//! Image transformation descriptors.
//!
//! A [`Transform`] only describes what should happen to a decoded image.
//! The pixel work lives in the application layer's transform chain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::errors::TransformError;

/// Upper bound accepted for a blur sigma.
pub const MAX_BLUR_SIGMA: f32 = 100.0;

bitflags::bitflags! {
    /// Selects which corners a [`Transform::RoundedCorners`] rounds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CornerMask: u8 {
        const TOP_LEFT = 1 << 0;
        const TOP_RIGHT = 1 << 1;
        const BOTTOM_LEFT = 1 << 2;
        const BOTTOM_RIGHT = 1 << 3;

        const TOP = Self::TOP_LEFT.bits() | Self::TOP_RIGHT.bits();
        const BOTTOM = Self::BOTTOM_LEFT.bits() | Self::BOTTOM_RIGHT.bits();
        const LEFT = Self::TOP_LEFT.bits() | Self::BOTTOM_LEFT.bits();
        const RIGHT = Self::TOP_RIGHT.bits() | Self::BOTTOM_RIGHT.bits();
        const ALL = Self::TOP.bits() | Self::BOTTOM.bits();
    }
}

impl Default for CornerMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromStr for CornerMask {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = Self::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            mask |= match part {
                "tl" => Self::TOP_LEFT,
                "tr" => Self::TOP_RIGHT,
                "bl" => Self::BOTTOM_LEFT,
                "br" => Self::BOTTOM_RIGHT,
                "top" => Self::TOP,
                "bottom" => Self::BOTTOM,
                "left" => Self::LEFT,
                "right" => Self::RIGHT,
                "all" => Self::ALL,
                other => {
                    return Err(TransformError::invalid(
                        "rounded",
                        format!("unknown corner `{other}`"),
                    ));
                }
            };
        }
        Ok(mask)
    }
}

/// A single step in a transform chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    /// Scale to fill the target size and crop the overflow evenly.
    CenterCrop,
    /// Crop to a centered square and mask everything outside the inscribed circle.
    CircleCrop,
    /// Round the selected corners with the given pixel radius.
    RoundedCorners {
        /// Corner radius in pixels.
        radius: u32,
        /// Corners to round.
        corners: CornerMask,
    },
    /// Gaussian blur.
    Blur {
        /// Blur strength (gaussian sigma).
        sigma: f32,
    },
    /// Drop color information.
    Grayscale,
}

impl Transform {
    /// Rounded corners on all four corners.
    #[must_use]
    pub const fn rounded(radius: u32) -> Self {
        Self::RoundedCorners {
            radius,
            corners: CornerMask::ALL,
        }
    }

    /// Short name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CenterCrop => "center_crop",
            Self::CircleCrop => "circle_crop",
            Self::RoundedCorners { .. } => "rounded",
            Self::Blur { .. } => "blur",
            Self::Grayscale => "grayscale",
        }
    }

    /// Returns true for transforms that decide the output geometry themselves.
    #[must_use]
    pub const fn is_crop(&self) -> bool {
        matches!(self, Self::CenterCrop | Self::CircleCrop)
    }

    /// Checks the parameters that can be judged without an image.
    ///
    /// # Errors
    /// Returns `TransformError::InvalidParameter` for out-of-range values.
    pub fn validate(&self) -> Result<(), TransformError> {
        match *self {
            Self::RoundedCorners { radius, corners } => {
                if radius == 0 {
                    return Err(TransformError::invalid(self.name(), "radius must be positive"));
                }
                if corners.is_empty() {
                    return Err(TransformError::invalid(self.name(), "no corners selected"));
                }
                Ok(())
            }
            Self::Blur { sigma } => {
                if !sigma.is_finite() || sigma <= 0.0 || sigma > MAX_BLUR_SIGMA {
                    return Err(TransformError::invalid(
                        self.name(),
                        format!("sigma {sigma} outside (0, {MAX_BLUR_SIGMA}]"),
                    ));
                }
                Ok(())
            }
            Self::CenterCrop | Self::CircleCrop | Self::Grayscale => Ok(()),
        }
    }

    /// Canonical fragment hashed into cache keys.
    ///
    /// Floats are written by bit pattern so equal parameters always produce
    /// identical fragments.
    pub(crate) fn key_fragment(&self) -> String {
        match *self {
            Self::CenterCrop => "center_crop".to_string(),
            Self::CircleCrop => "circle_crop".to_string(),
            Self::RoundedCorners { radius, corners } => {
                format!("rounded(r={radius},c={:#04x})", corners.bits())
            }
            Self::Blur { sigma } => format!("blur(s={:#010x})", sigma.to_bits()),
            Self::Grayscale => "grayscale".to_string(),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CenterCrop => write!(f, "center-crop"),
            Self::CircleCrop => write!(f, "circle-crop"),
            Self::RoundedCorners { radius, corners } => {
                write!(f, "rounded:{radius}:{:#04x}", corners.bits())
            }
            Self::Blur { sigma } => write!(f, "blur:{sigma}"),
            Self::Grayscale => write!(f, "grayscale"),
        }
    }
}

impl FromStr for Transform {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');
        let name = parts.next().unwrap_or_default();
        let transform = match name {
            "center-crop" => Self::CenterCrop,
            "circle-crop" => Self::CircleCrop,
            "grayscale" => Self::Grayscale,
            "blur" => {
                let sigma = parts
                    .next()
                    .ok_or_else(|| TransformError::invalid("blur", "missing sigma"))?
                    .parse::<f32>()
                    .map_err(|e| TransformError::invalid("blur", e.to_string()))?;
                Self::Blur { sigma }
            }
            "rounded" => {
                let radius = parts
                    .next()
                    .ok_or_else(|| TransformError::invalid("rounded", "missing radius"))?
                    .parse::<u32>()
                    .map_err(|e| TransformError::invalid("rounded", e.to_string()))?;
                let corners = parts.next().map_or(Ok(CornerMask::ALL), str::parse)?;
                Self::RoundedCorners { radius, corners }
            }
            other => {
                return Err(TransformError::Unsupported {
                    transform: other.to_string(),
                    reason: "unknown transform".to_string(),
                });
            }
        };
        transform.validate()?;
        Ok(transform)
    }
}

/// Converts density-independent pixels to physical pixels.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn dip_to_px(dp: f32, scale: f32) -> u32 {
    (dp * scale + 0.5).max(0.0) as u32
}
