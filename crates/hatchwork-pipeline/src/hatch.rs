//! Stylized hatching.
//!
//! Each pixel is classified from two tests: its luminance against a
//! threshold, and a periodic line `sin(a * u + b * v)` against a cut-off
//! `c`, where `(u, v)` are the pixel coordinates normalized by the image
//! size. The result is pure black or pure white.

use std::ops::Range;

use crate::edge::{BLACK, WHITE};
use crate::grayscale::luminance_at;
use crate::types::{CHANNELS, HatchParams};

/// Value of the hatch line at normalized coordinates `(u, v)`.
#[must_use]
pub fn hatch_line(params: &HatchParams, u: f32, v: f32) -> f32 {
    params.a.mul_add(u, params.b * v).sin()
}

/// Whether a pixel with luminance `gray` and hatch line value `line` is
/// painted white.
///
/// Without `invert` the background is black and both bright pixels and
/// hatch lines are white. With `invert`, dark pixels are white and bright
/// pixels show the hatch lines in black. The two modes are deliberately
/// not complements of each other.
#[must_use]
pub fn is_white(params: &HatchParams, gray: f32, line: f32) -> bool {
    if params.invert {
        gray < params.threshold || line <= params.c
    } else {
        gray > params.threshold || line > params.c
    }
}

/// Hatching output for the flattened pixel indices in `pixels`.
///
/// Returns `pixels.len() * 4` bytes, the same layout as that span of the
/// full output buffer.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn hatch_pixels(
    raw: &[u8],
    width: usize,
    height: usize,
    pixels: Range<usize>,
    params: &HatchParams,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * CHANNELS);
    for i in pixels {
        let u = (i % width) as f32 / width as f32;
        let v = (i / width) as f32 / height as f32;
        let gray = luminance_at(raw, i);
        let line = hatch_line(params, u, v);
        let pixel = if is_white(params, gray, line) {
            WHITE
        } else {
            BLACK
        };
        out.extend_from_slice(&pixel);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RgbaImage;

    const PLAIN: HatchParams = HatchParams::new(400.0, 0.0, 0.99, 0.5, false);
    const INVERTED: HatchParams = HatchParams::new(400.0, 0.0, 0.99, 0.5, true);

    #[test]
    fn plain_truth_table() {
        // bright -> white regardless of line
        assert!(is_white(&PLAIN, 0.9, -1.0));
        assert!(is_white(&PLAIN, 0.9, 1.0));
        // dark -> white only on a hatch line
        assert!(is_white(&PLAIN, 0.1, 0.995));
        assert!(!is_white(&PLAIN, 0.1, 0.5));
        // exactly at threshold counts as dark
        assert!(!is_white(&PLAIN, 0.5, 0.0));
    }

    #[test]
    fn inverted_truth_table() {
        // dark -> white regardless of line
        assert!(is_white(&INVERTED, 0.1, 1.0));
        assert!(is_white(&INVERTED, 0.1, -1.0));
        // bright -> black only on a hatch line
        assert!(!is_white(&INVERTED, 0.9, 0.995));
        assert!(is_white(&INVERTED, 0.9, 0.5));
        // exactly at threshold counts as bright
        assert!(!is_white(&INVERTED, 0.5, 0.995));
    }

    #[test]
    fn modes_are_not_complements() {
        // Bright pixel off any hatch line is white in both modes.
        assert!(is_white(&PLAIN, 0.9, 0.0));
        assert!(is_white(&INVERTED, 0.9, 0.0));
    }

    #[test]
    fn line_at_origin_is_zero() {
        assert!(hatch_line(&PLAIN, 0.0, 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn output_is_binary_and_opaque() {
        let img = RgbaImage::from_fn(16, 9, |x, y| {
            image::Rgba([(x * 16) as u8, (y * 28) as u8, 90, 255])
        });
        for params in [PLAIN, INVERTED] {
            let out = hatch_pixels(img.as_raw(), 16, 9, 0..16 * 9, &params);
            assert_eq!(out.len(), 16 * 9 * 4);
            assert!(out.chunks_exact(4).all(|p| p == BLACK || p == WHITE));
        }
    }

    #[test]
    fn white_image_plain_is_white() {
        let img = RgbaImage::from_pixel(5, 5, image::Rgba(WHITE));
        let out = hatch_pixels(img.as_raw(), 5, 5, 0..25, &PLAIN);
        assert!(out.chunks_exact(4).all(|p| p == WHITE));
    }

    #[test]
    fn black_image_inverted_is_white() {
        let img = RgbaImage::from_pixel(5, 5, image::Rgba(BLACK));
        let out = hatch_pixels(img.as_raw(), 5, 5, 0..25, &INVERTED);
        assert!(out.chunks_exact(4).all(|p| p == WHITE));
    }

    #[test]
    fn black_image_plain_shows_lines() {
        // a = 2π over the width puts exactly one line crest per row.
        let params = HatchParams::new(std::f32::consts::TAU, 0.0, 0.9, 0.5, false);
        let img = RgbaImage::from_pixel(8, 2, image::Rgba(BLACK));
        let out = hatch_pixels(img.as_raw(), 8, 2, 0..16, &params);
        // x = 2 -> u = 0.25 -> sin(π/2) = 1 > 0.9
        assert_eq!(&out[2 * 4..3 * 4], WHITE);
        // x = 0 -> sin(0) = 0
        assert_eq!(&out[0..4], BLACK);
    }

    #[test]
    fn pixel_span_matches_full_output() {
        let img = RgbaImage::from_fn(7, 5, |x, y| {
            image::Rgba([(x * 30) as u8, (y * 50) as u8, 0, 255])
        });
        let full = hatch_pixels(img.as_raw(), 7, 5, 0..35, &INVERTED);
        let part = hatch_pixels(img.as_raw(), 7, 5, 10..23, &INVERTED);
        assert_eq!(part, full[10 * 4..23 * 4]);
    }
}
