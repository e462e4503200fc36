//! Luminance of RGBA pixels.
//!
//! The sketch kernels use a fixed `0.21 R + 0.71 G + 0.07 B` weighting on
//! channels normalized to `[0, 1]`. This is not Rec. 601 or Rec. 709 and
//! the weights sum to 0.99, so pure white maps to 0.99 rather than 1.0.

use crate::types::CHANNELS;

/// Luminance weights for the red, green and blue channels.
pub const LUMA_WEIGHTS: [f32; 3] = [0.21, 0.71, 0.07];

/// Luminance of one RGBA pixel (alpha is ignored).
#[must_use]
#[allow(clippy::suboptimal_flops)]
pub fn luminance(pixel: &[u8]) -> f32 {
    let r = f32::from(pixel[0]) / 255.0;
    let g = f32::from(pixel[1]) / 255.0;
    let b = f32::from(pixel[2]) / 255.0;
    LUMA_WEIGHTS[0] * r + LUMA_WEIGHTS[1] * g + LUMA_WEIGHTS[2] * b
}

/// Luminance of the pixel at flattened index `pixel` of a raw RGBA buffer.
#[must_use]
pub fn luminance_at(raw: &[u8], pixel: usize) -> f32 {
    let offset = pixel * CHANNELS;
    luminance(&raw[offset..offset + CHANNELS])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_is_zero() {
        assert!(luminance(&[0, 0, 0, 255]).abs() < f32::EPSILON);
    }

    #[test]
    fn white_is_weight_sum() {
        let white = luminance(&[255, 255, 255, 255]);
        assert!((white - 0.99).abs() < 1e-6, "got {white}");
    }

    #[test]
    fn single_channels_match_weights() {
        assert!((luminance(&[255, 0, 0, 255]) - 0.21).abs() < 1e-6);
        assert!((luminance(&[0, 255, 0, 255]) - 0.71).abs() < 1e-6);
        assert!((luminance(&[0, 0, 255, 255]) - 0.07).abs() < 1e-6);
    }

    #[test]
    fn green_brightest_blue_darkest() {
        let r = luminance(&[255, 0, 0, 255]);
        let g = luminance(&[0, 255, 0, 255]);
        let b = luminance(&[0, 0, 255, 255]);
        assert!(g > r && r > b, "expected green > red > blue, got {r} {g} {b}");
    }

    #[test]
    fn alpha_is_ignored() {
        let opaque = luminance(&[10, 200, 30, 255]);
        let clear = luminance(&[10, 200, 30, 0]);
        assert!((opaque - clear).abs() < f32::EPSILON);
    }

    #[test]
    fn indexed_lookup() {
        let raw = [0, 0, 0, 255, 0, 255, 0, 255];
        assert!(luminance_at(&raw, 0).abs() < f32::EPSILON);
        assert!((luminance_at(&raw, 1) - 0.71).abs() < 1e-6);
    }
}
