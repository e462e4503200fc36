//! Sobel edge detection with binarization.
//!
//! The 3x3 Sobel operator is applied to the luminance of each pixel's
//! neighborhood, sampling with edge clamping. Pixels whose gradient
//! magnitude reaches the threshold become black ink; everything else is
//! white paper.

use std::ops::Range;

use crate::grayscale::luminance_at;
use crate::types::CHANNELS;

/// Ink (edge) pixel.
pub const BLACK: [u8; 4] = [0, 0, 0, 255];

/// Paper (non-edge) pixel.
pub const WHITE: [u8; 4] = [255, 255, 255, 255];

/// Sobel gradient magnitude of luminance at `(x, y)`.
///
/// `raw` is a `width * height` RGBA buffer; neighbors outside the image
/// are clamped to the nearest edge pixel. The kernels
///
/// ```text
/// Gx = [-1 0 1]    Gy = [-1 -2 -1]
///      [-2 0 2]         [ 0  0  0]
///      [-1 0 1]         [ 1  2  1]
/// ```
///
/// are expanded into differences of opposite taps, which keeps the
/// gradient of a flat region at exactly zero.
#[must_use]
pub fn gradient_magnitude(raw: &[u8], width: usize, height: usize, x: usize, y: usize) -> f32 {
    let xs = [x.saturating_sub(1), x, (x + 1).min(width - 1)];
    let ys = [y.saturating_sub(1), y, (y + 1).min(height - 1)];
    let g = |i: usize, j: usize| luminance_at(raw, ys[j] * width + xs[i]);

    let grad_x = 2.0_f32.mul_add(g(2, 1) - g(0, 1), g(2, 0) - g(0, 0)) + (g(2, 2) - g(0, 2));
    let grad_y = 2.0_f32.mul_add(g(1, 2) - g(1, 0), g(0, 2) - g(0, 0)) + (g(2, 2) - g(2, 0));
    grad_x.hypot(grad_y)
}

/// Binarized Sobel output for `rows` of the image.
///
/// Returns `rows.len() * width * 4` bytes laid out exactly as those rows
/// are in the full output buffer.
#[must_use]
pub fn sobel_rows(
    raw: &[u8],
    width: usize,
    height: usize,
    rows: Range<usize>,
    threshold: f32,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(rows.len() * width * CHANNELS);
    for y in rows {
        for x in 0..width {
            let magnitude = gradient_magnitude(raw, width, height, x, y);
            let pixel = if magnitude >= threshold { BLACK } else { WHITE };
            out.extend_from_slice(&pixel);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RgbaImage;

    /// 8x8 image, black on the left half and white on the right.
    fn sharp_edge_image() -> RgbaImage {
        RgbaImage::from_fn(8, 8, |x, _y| {
            if x < 4 {
                image::Rgba(BLACK)
            } else {
                image::Rgba(WHITE)
            }
        })
    }

    fn run(img: &RgbaImage, threshold: f32) -> Vec<u8> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        sobel_rows(img.as_raw(), w, h, 0..h, threshold)
    }

    #[test]
    fn uniform_image_is_all_white() {
        let img = RgbaImage::from_fn(6, 5, |_, _| image::Rgba([90, 140, 20, 255]));
        for threshold in [1e-6, 0.1, 0.3, 2.0] {
            let out = run(&img, threshold);
            assert!(out.iter().all(|&v| v == 255), "threshold {threshold}");
        }
    }

    #[test]
    fn uniform_magnitude_is_exactly_zero() {
        let img = RgbaImage::from_fn(3, 3, |_, _| image::Rgba([17, 99, 201, 255]));
        let m = gradient_magnitude(img.as_raw(), 3, 3, 1, 1);
        assert!(m == 0.0, "expected zero gradient, got {m}");
    }

    #[test]
    fn zero_threshold_marks_everything() {
        // magnitude >= 0 always holds, so every pixel is ink.
        let img = RgbaImage::from_fn(4, 4, |_, _| image::Rgba(WHITE));
        let out = run(&img, 0.0);
        assert!(out.chunks_exact(4).all(|p| p == BLACK));
    }

    #[test]
    fn sharp_boundary_is_detected() {
        let img = sharp_edge_image();
        let out = run(&img, 0.3);
        let at = |x: usize, y: usize| &out[(y * 8 + x) * 4..(y * 8 + x) * 4 + 4];
        assert_eq!(at(3, 4), BLACK);
        assert_eq!(at(4, 4), BLACK);
        assert_eq!(at(0, 4), WHITE);
        assert_eq!(at(7, 4), WHITE);
    }

    #[test]
    fn clamped_corner_sampling() {
        // A single bright corner pixel still produces a gradient at the
        // corner itself because the clamp repeats it rather than padding.
        let mut img = RgbaImage::from_pixel(4, 4, image::Rgba(BLACK));
        img.put_pixel(0, 0, image::Rgba(WHITE));
        let m = gradient_magnitude(img.as_raw(), 4, 4, 0, 0);
        assert!(m > 0.0);
    }

    #[test]
    fn rows_subset_matches_full_output() {
        let img = sharp_edge_image();
        let full = run(&img, 0.3);
        let part = sobel_rows(img.as_raw(), 8, 8, 2..5, 0.3);
        assert_eq!(part.len(), 3 * 8 * 4);
        assert_eq!(part, full[2 * 8 * 4..5 * 8 * 4]);
    }

    #[test]
    fn output_alpha_is_opaque() {
        let img = RgbaImage::from_fn(4, 4, |x, y| {
            image::Rgba([0, 0, 0, if x == y { 0 } else { 128 }])
        });
        let out = run(&img, 0.1);
        assert!(out.chunks_exact(4).all(|p| p[3] == 255));
    }
}
