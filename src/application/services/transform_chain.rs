//! Applies ordered transform chains to decoded images.
//!
//! Every step reads its input by reference and returns a new image, so a
//! decoded source shared with a cache is never modified.

use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};

use crate::domain::entities::{CornerMask, TargetSize, Transform};
use crate::domain::errors::TransformError;

const FILTER: FilterType = FilterType::Lanczos3;

/// Stateless transform chain runner.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformChain;

impl TransformChain {
    /// Sizes `image` for `target` and applies `transforms` in order.
    ///
    /// Without a crop in the chain, an image larger than the target is
    /// downsampled to fit inside it first.
    ///
    /// # Errors
    /// Returns the first `TransformError` raised by a step.
    pub fn apply(
        image: &DynamicImage,
        transforms: &[Transform],
        target: Option<TargetSize>,
    ) -> Result<DynamicImage, TransformError> {
        for transform in transforms {
            transform.validate()?;
        }

        let mut current = match target {
            Some(size) if !transforms.iter().any(Transform::is_crop) => fit_inside(image, size),
            _ => image.clone(),
        };

        for transform in transforms {
            current = Self::apply_one(&current, *transform, target)?;
        }
        Ok(current)
    }

    /// Applies a single transform.
    ///
    /// # Errors
    /// Returns `TransformError` if the parameters do not fit the image.
    pub fn apply_one(
        image: &DynamicImage,
        transform: Transform,
        target: Option<TargetSize>,
    ) -> Result<DynamicImage, TransformError> {
        transform.validate()?;
        match transform {
            Transform::CenterCrop => Ok(match target {
                Some(size) => image.resize_to_fill(size.width, size.height, FILTER),
                None => image.clone(),
            }),
            Transform::CircleCrop => Ok(circle_crop(image, target)),
            Transform::RoundedCorners { radius, corners } => rounded_corners(image, radius, corners),
            Transform::Blur { sigma } => Ok(image.blur(sigma)),
            Transform::Grayscale => Ok(image.grayscale()),
        }
    }
}

fn fit_inside(image: &DynamicImage, size: TargetSize) -> DynamicImage {
    if image.width() <= size.width && image.height() <= size.height {
        image.clone()
    } else {
        image.resize(size.width, size.height, FILTER)
    }
}

fn circle_crop(image: &DynamicImage, target: Option<TargetSize>) -> DynamicImage {
    let side = target.map_or_else(|| image.width().min(image.height()), TargetSize::min_side);
    let side = side.max(1);
    let mut square = image.resize_to_fill(side, side, FILTER).to_rgba8();

    #[allow(clippy::cast_precision_loss)]
    let radius = side as f32 / 2.0;
    apply_mask(&mut square, |x, y| coverage(x, y, radius, radius, radius));
    DynamicImage::ImageRgba8(square)
}

fn rounded_corners(
    image: &DynamicImage,
    radius: u32,
    corners: CornerMask,
) -> Result<DynamicImage, TransformError> {
    let (width, height) = (image.width(), image.height());
    if radius.saturating_mul(2) > width.min(height) {
        return Err(TransformError::invalid(
            "rounded",
            format!("radius {radius} too large for {width}x{height} image"),
        ));
    }

    let mut rgba = image.to_rgba8();
    #[allow(clippy::cast_precision_loss)]
    let (r, w, h) = (radius as f32, width as f32, height as f32);
    apply_mask(&mut rgba, |x, y| {
        let (cx, cy) = match (x < r, y < r, x >= w - r, y >= h - r) {
            (true, true, _, _) if corners.contains(CornerMask::TOP_LEFT) => (r, r),
            (_, true, true, _) if corners.contains(CornerMask::TOP_RIGHT) => (w - r, r),
            (true, _, _, true) if corners.contains(CornerMask::BOTTOM_LEFT) => (r, h - r),
            (_, _, true, true) if corners.contains(CornerMask::BOTTOM_RIGHT) => (w - r, h - r),
            _ => return 1.0,
        };
        coverage(x, y, cx, cy, r)
    });
    Ok(DynamicImage::ImageRgba8(rgba))
}

/// Fraction of the pixel centered at (`x`, `y`) inside the circle, with a
/// one pixel anti-aliased edge.
fn coverage(x: f32, y: f32, cx: f32, cy: f32, radius: f32) -> f32 {
    let distance = (x - cx).hypot(y - cy);
    (radius - distance + 0.5).clamp(0.0, 1.0)
}

/// Scales each pixel's alpha by `mask(center_x, center_y)`.
fn apply_mask(rgba: &mut RgbaImage, mask: impl Fn(f32, f32) -> f32) {
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        #[allow(clippy::cast_precision_loss)]
        let factor = mask(x as f32 + 0.5, y as f32 + 0.5);
        if factor < 1.0 {
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let alpha = (f32::from(pixel[3]) * factor).round() as u8;
            pixel[3] = alpha;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba};

    fn opaque(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255])))
    }

    fn alpha(img: &DynamicImage, x: u32, y: u32) -> u8 {
        img.get_pixel(x, y).0[3]
    }

    fn size(w: u32, h: u32) -> Option<TargetSize> {
        Some(TargetSize::new(w, h).unwrap())
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let src = opaque(8, 4);
        let out = TransformChain::apply(&src, &[], None).unwrap();
        assert_eq!(out.to_rgba8().as_raw(), src.to_rgba8().as_raw());
    }

    #[test]
    fn test_target_size_downsamples_preserving_aspect() {
        let out = TransformChain::apply(&opaque(200, 100), &[], size(50, 50)).unwrap();
        assert_eq!(out.dimensions(), (50, 25));
    }

    #[test]
    fn test_target_size_never_upscales() {
        let out = TransformChain::apply(&opaque(20, 10), &[], size(50, 50)).unwrap();
        assert_eq!(out.dimensions(), (20, 10));
    }

    #[test]
    fn test_center_crop_fills_target() {
        let out = TransformChain::apply(&opaque(200, 100), &[Transform::CenterCrop], size(40, 60))
            .unwrap();
        assert_eq!(out.dimensions(), (40, 60));
    }

    #[test]
    fn test_circle_crop_masks_corners() {
        let out = TransformChain::apply(&opaque(30, 20), &[Transform::CircleCrop], None).unwrap();
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(alpha(&out, 0, 0), 0);
        assert_eq!(alpha(&out, 19, 19), 0);
        assert_eq!(alpha(&out, 10, 10), 255);
    }

    #[test]
    fn test_circle_crop_uses_target_short_side() {
        let out = TransformChain::apply(&opaque(100, 100), &[Transform::CircleCrop], size(32, 48))
            .unwrap();
        assert_eq!(out.dimensions(), (32, 32));
    }

    #[test]
    fn test_rounded_corners_only_selected() {
        let transform = Transform::RoundedCorners {
            radius: 5,
            corners: CornerMask::TOP_LEFT,
        };
        let out = TransformChain::apply(&opaque(20, 20), &[transform], None).unwrap();
        assert_eq!(alpha(&out, 0, 0), 0);
        assert_eq!(alpha(&out, 19, 0), 255);
        assert_eq!(alpha(&out, 0, 19), 255);
        assert_eq!(alpha(&out, 19, 19), 255);
        assert_eq!(alpha(&out, 10, 10), 255);
    }

    #[test]
    fn test_rounded_radius_too_large_fails() {
        let err = TransformChain::apply(&opaque(10, 10), &[Transform::rounded(6)], None).unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameter { .. }));
    }

    #[test]
    fn test_invalid_blur_fails_instead_of_clamping() {
        let err = TransformChain::apply(&opaque(10, 10), &[Transform::Blur { sigma: -1.0 }], None)
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameter { .. }));
    }

    #[test]
    fn test_grayscale_equalizes_channels() {
        let out = TransformChain::apply(&opaque(4, 4), &[Transform::Grayscale], None).unwrap();
        let px = out.to_rgba8().get_pixel(1, 1).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn test_blur_keeps_dimensions() {
        let out = TransformChain::apply(&opaque(16, 9), &[Transform::Blur { sigma: 2.0 }], None)
            .unwrap();
        assert_eq!(out.dimensions(), (16, 9));
    }

    #[test]
    fn test_order_matters() {
        let src = opaque(40, 20);
        let crop_then_round = TransformChain::apply(
            &src,
            &[Transform::CenterCrop, Transform::rounded(10)],
            size(20, 20),
        )
        .unwrap();
        let round_then_crop = TransformChain::apply(
            &src,
            &[Transform::rounded(10), Transform::CenterCrop],
            size(20, 20),
        )
        .unwrap();
        assert_ne!(
            crop_then_round.to_rgba8().as_raw(),
            round_then_crop.to_rgba8().as_raw()
        );
    }

    #[test]
    fn test_input_is_not_mutated() {
        let src = opaque(10, 10);
        let before = src.to_rgba8().into_raw();
        let _ = TransformChain::apply(&src, &[Transform::CircleCrop, Transform::Grayscale], None)
            .unwrap();
        assert_eq!(src.to_rgba8().into_raw(), before);
    }
}
