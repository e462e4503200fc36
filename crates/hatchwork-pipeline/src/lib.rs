//! hatchwork-pipeline: Parallel pencil-sketch pipeline (sans-IO).
//!
//! Turns an RGBA image into a pencil-sketch rendition through:
//! horizontal blur -> vertical blur -> hatching x3 -> combine, with Sobel
//! edges of the original laid over the result.
//!
//! Every kernel is fanned out over a fixed-size worker pool
//! ([`pool::TaskPool`]): the image is split into one contiguous range of
//! rows, columns or pixels per worker, each task computes its range, and
//! a barrier closes the stage before the next one reads its output.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! RGBA buffers. Hosts that keep pixels elsewhere plug in through the
//! [`surface`] traits.

pub mod blur;
pub mod combine;
pub mod diagnostics;
pub mod edge;
pub mod grayscale;
pub mod hatch;
pub mod partition;
pub mod pipeline;
pub mod pool;
pub mod sketch;
pub mod surface;
pub mod types;

use std::sync::Arc;

pub use diagnostics::{Clock, PipelineDiagnostics, SystemClock};
pub use pool::{Kernel, PoolError, PoolStats, TaskPool};
pub use sketch::Sketcher;
pub use surface::{PixelSink, PixelSource, PixelStore, process_surfaces};
pub use types::{
    BlurParams, Dimensions, HatchParams, PipelineConfig, PipelineError, RgbaImage, SharedImage,
    StageId, StagedResult,
};

/// Run the full sketch pipeline and return the stage selected by
/// `config.output`.
///
/// # Pipeline steps
///
/// - 0: snapshot the original
/// - 1: horizontal Gaussian pass
/// - 2: vertical Gaussian pass (separable blur complete)
/// - 3: Sobel edges + binarization of the original
/// - 4-6: hatching passes over the blurred image
/// - 7: darkest-wins combination of the three hatchings
/// - 8: combination of the edges with the hatchings
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` does not validate,
/// or the first kernel error encountered.
pub fn process(
    sketcher: &Sketcher,
    original: RgbaImage,
    config: &PipelineConfig,
) -> Result<SharedImage, PipelineError> {
    let staged = process_staged(sketcher, original, config)?;
    Ok(Arc::clone(staged.stage(config.output)))
}

/// Run the full sketch pipeline and return every stage buffer.
///
/// # Errors
///
/// See [`process`].
pub fn process_staged(
    sketcher: &Sketcher,
    original: RgbaImage,
    config: &PipelineConfig,
) -> Result<StagedResult, PipelineError> {
    pipeline::run(sketcher, original, config, &SystemClock).map(|(staged, _)| staged)
}
