//! Host-facing pixel surfaces.
//!
//! The pipeline itself only sees owned [`RgbaImage`]s. Hosts that keep
//! their buffers elsewhere (textures, a window's back buffer, a file
//! cache) expose them by name through [`PixelSource`] and [`PixelSink`],
//! and [`process_surfaces`] moves pixels across that boundary exactly once
//! in each direction.

use std::collections::HashMap;

use crate::diagnostics::{Clock, PipelineDiagnostics};
use crate::pipeline;
use crate::sketch::Sketcher;
use crate::types::{Dimensions, PipelineConfig, PipelineError, RgbaImage, expect_dimensions};

/// Readable RGBA pixel buffers keyed by handle.
pub trait PixelSource {
    /// Copy out the `dims.width * dims.height * 4` bytes behind `handle`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::MissingResource`] if no buffer is registered under
    /// `handle`, [`PipelineError::DimensionMismatch`] if it has another
    /// shape.
    fn read_pixels(&self, handle: &str, dims: Dimensions) -> Result<Vec<u8>, PipelineError>;
}

/// Writable RGBA pixel buffers keyed by handle.
pub trait PixelSink {
    /// Replace the contents behind `handle` with `pixels`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::BufferSize`] if `pixels` is not
    /// `dims.width * dims.height * 4` bytes long, or an implementation
    /// specific error if `handle` cannot take a buffer of that shape.
    fn write_pixels(
        &mut self,
        handle: &str,
        dims: Dimensions,
        pixels: &[u8],
    ) -> Result<(), PipelineError>;
}

/// In-memory surface: named [`RgbaImage`]s.
///
/// Writing to an unknown handle creates it; writing to an existing handle
/// requires the same dimensions.
#[derive(Debug, Clone, Default)]
pub struct PixelStore {
    buffers: HashMap<String, RgbaImage>,
}

impl PixelStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `image` under `handle`, returning whatever was there.
    pub fn insert(&mut self, handle: impl Into<String>, image: RgbaImage) -> Option<RgbaImage> {
        self.buffers.insert(handle.into(), image)
    }

    /// The buffer under `handle`.
    #[must_use]
    pub fn get(&self, handle: &str) -> Option<&RgbaImage> {
        self.buffers.get(handle)
    }

    /// Remove and return the buffer under `handle`.
    pub fn take(&mut self, handle: &str) -> Option<RgbaImage> {
        self.buffers.remove(handle)
    }

    /// Shape of the buffer under `handle`.
    #[must_use]
    pub fn dimensions(&self, handle: &str) -> Option<Dimensions> {
        self.get(handle).map(Dimensions::of)
    }
}

impl PixelSource for PixelStore {
    fn read_pixels(&self, handle: &str, dims: Dimensions) -> Result<Vec<u8>, PipelineError> {
        let image = self
            .get(handle)
            .ok_or_else(|| PipelineError::MissingResource(handle.to_owned()))?;
        expect_dimensions(image, dims)?;
        Ok(image.as_raw().clone())
    }
}

impl PixelSink for PixelStore {
    fn write_pixels(
        &mut self,
        handle: &str,
        dims: Dimensions,
        pixels: &[u8],
    ) -> Result<(), PipelineError> {
        if let Some(existing) = self.buffers.get(handle) {
            expect_dimensions(existing, dims)?;
        }
        let image = image_from_raw(dims, pixels.to_vec())?;
        self.buffers.insert(handle.to_owned(), image);
        Ok(())
    }
}

/// Wrap raw RGBA bytes as an image of `dims`.
///
/// # Errors
///
/// [`PipelineError::BufferSize`] if the length does not match.
pub fn image_from_raw(dims: Dimensions, pixels: Vec<u8>) -> Result<RgbaImage, PipelineError> {
    let actual = pixels.len();
    RgbaImage::from_raw(dims.width, dims.height, pixels).ok_or(PipelineError::BufferSize {
        expected: dims.byte_len(),
        actual,
    })
}

/// Read `input` from `source`, run the pipeline, and write the stage
/// selected by `config.output` to `output` on `sink`.
///
/// Nothing is written to the sink unless every stage succeeded.
///
/// # Errors
///
/// Any error from the source, the pipeline or the sink. A missing input
/// is also logged at error level.
#[allow(clippy::too_many_arguments)]
pub fn process_surfaces<S, K, C>(
    sketcher: &Sketcher,
    source: &S,
    sink: &mut K,
    input: &str,
    output: &str,
    dims: Dimensions,
    config: &PipelineConfig,
    clock: &C,
) -> Result<PipelineDiagnostics, PipelineError>
where
    S: PixelSource + ?Sized,
    K: PixelSink + ?Sized,
    C: Clock,
{
    let pixels = source.read_pixels(input, dims).inspect_err(|e| {
        log::error!("cannot read '{input}': {e}");
    })?;
    let original = image_from_raw(dims, pixels)?;
    let (staged, diagnostics) = pipeline::run(sketcher, original, config, clock)?;
    let selected = staged.stage(config.output);
    log::debug!("writing stage {} to '{output}'", config.output);
    sink.write_pixels(output, dims, selected.as_raw())
        .inspect_err(|e| log::error!("cannot write '{output}': {e}"))?;
    Ok(diagnostics)
}
