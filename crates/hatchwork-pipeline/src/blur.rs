//! Separable Gaussian blur.
//!
//! A 2-D Gaussian blur is run as two 1-D passes: [`horizontal_rows`]
//! varies `x` with `y` fixed, then [`vertical_columns`] varies `y` with
//! `x` fixed. Both sample with edge clamping, blur only R, G and B, and
//! force alpha to 255.
//!
//! The horizontal pass is partitioned by rows and the vertical pass by
//! columns, so each produces its output in a different layout; see the
//! function docs.

use std::f32::consts::PI;
use std::ops::Range;

use crate::types::{BlurParams, CHANNELS, PipelineError};

/// Unnormalized Gaussian density at integer offset `mu`.
///
/// `exp(-mu² / 2σ²) / (sqrt(2π) σ)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn gaussian_weight(mu: i64, sigma: f32) -> f32 {
    let mu = mu as f32;
    (-(mu * mu) / (2.0 * sigma * sigma)).exp() / ((2.0 * PI).sqrt() * sigma)
}

/// Normalized 1-D Gaussian window of `2 * radius + 1` taps.
///
/// Index `k` holds the weight for offset `k - radius`. The taps sum to 1.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `params` fail
/// [`BlurParams::check`] or the taps do not sum to a finite positive value.
pub fn gaussian_weights(params: BlurParams) -> Result<Vec<f32>, PipelineError> {
    params.check()?;
    let BlurParams { radius, sigma } = params;
    let radius = i64::from(radius);
    let mut weights: Vec<f32> = (-radius..=radius)
        .map(|mu| gaussian_weight(mu, sigma))
        .collect();
    let sum: f32 = weights.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "gaussian window for sigma {sigma} does not normalize (sum {sum})"
        )));
    }
    for w in &mut weights {
        *w /= sum;
    }
    Ok(weights)
}

/// Weighted sum back to a channel value, rounded to nearest.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Blur one pixel from the taps yielded by `taps` (pixel indices, in
/// window order).
fn blur_pixel(raw: &[u8], weights: &[f32], taps: impl Iterator<Item = usize>) -> [u8; 4] {
    let mut sum = [0.0_f32; 3];
    for (pixel, weight) in taps.zip(weights) {
        let offset = pixel * CHANNELS;
        for (acc, &channel) in sum.iter_mut().zip(&raw[offset..offset + 3]) {
            *acc = f32::from(channel).mul_add(*weight, *acc);
        }
    }
    [to_channel(sum[0]), to_channel(sum[1]), to_channel(sum[2]), 255]
}

/// Horizontal pass over `rows`.
///
/// Returns `rows.len() * width * 4` bytes in row-major order, exactly as
/// those rows sit in the full output buffer.
#[must_use]
pub fn horizontal_rows(raw: &[u8], width: usize, rows: Range<usize>, weights: &[f32]) -> Vec<u8> {
    let radius = weights.len() / 2;
    let mut out = Vec::with_capacity(rows.len() * width * CHANNELS);
    for y in rows {
        let row = y * width;
        for x in 0..width {
            let taps = (0..weights.len())
                .map(|k| row + (x + k).saturating_sub(radius).min(width - 1));
            out.extend_from_slice(&blur_pixel(raw, weights, taps));
        }
    }
    out
}

/// Vertical pass over `columns`.
///
/// Returns `height * columns.len() * 4` bytes ordered row by row across
/// the column block: row `y` of the block is the output for pixels
/// `(columns, y)`. The caller scatters each block row into its place in
/// the full buffer.
#[must_use]
pub fn vertical_columns(
    raw: &[u8],
    width: usize,
    height: usize,
    columns: Range<usize>,
    weights: &[f32],
) -> Vec<u8> {
    let radius = weights.len() / 2;
    let mut out = Vec::with_capacity(height * columns.len() * CHANNELS);
    for y in 0..height {
        for x in columns.clone() {
            let taps = (0..weights.len())
                .map(|k| (y + k).saturating_sub(radius).min(height - 1) * width + x);
            out.extend_from_slice(&blur_pixel(raw, weights, taps));
        }
    }
    out
}
