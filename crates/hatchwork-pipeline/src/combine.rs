//! Darkest-wins combination of equally sized buffers.
//!
//! Each output channel is the minimum of that channel across all inputs,
//! so black ink in any input survives. Alpha is always 255.

use std::borrow::Borrow;
use std::ops::Range;

use crate::types::{CHANNELS, RgbaImage};

/// Per-channel minimum over `inputs` for the flattened pixel indices in
/// `pixels`.
///
/// Every input must have at least `pixels.end` pixels. Returns
/// `pixels.len() * 4` bytes. With no inputs every pixel is opaque white.
#[must_use]
pub fn min_pixels<I: Borrow<RgbaImage>>(inputs: &[I], pixels: Range<usize>) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * CHANNELS);
    for i in pixels {
        let offset = i * CHANNELS;
        let mut pixel = [255_u8; 4];
        for input in inputs {
            let raw = input.borrow().as_raw();
            for (acc, &channel) in pixel.iter_mut().zip(&raw[offset..offset + 3]) {
                *acc = (*acc).min(channel);
            }
        }
        out.extend_from_slice(&pixel);
    }
    out
}
