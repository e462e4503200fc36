//! Shared types for the hatchwork sketch pipeline.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::pool::{Kernel, PoolError};

/// Re-export `RgbaImage` so downstream crates can reference stage
/// buffers without depending on `image` directly.
///
/// The raw layout is row-major RGBA8: channel `c` of pixel `(x, y)`
/// lives at byte `(y * width + x) * 4 + c`.
pub use image::RgbaImage;

/// A stage buffer handed to a fan-out.
///
/// Once a stage has written its output it is frozen behind an `Arc` and
/// only ever read; worker tasks hold clones for the duration of the next
/// stage.
pub type SharedImage = Arc<RgbaImage>;

/// Bytes per RGBA8 pixel.
pub const CHANNELS: usize = 4;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an existing image.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Length of an RGBA8 buffer with these dimensions.
    #[must_use]
    pub const fn byte_len(self) -> usize {
        self.pixel_count() * CHANNELS
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parameters for one separable Gaussian blur pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlurParams {
    /// Half-width of the 1-D window; the window has `2 * radius + 1` taps.
    /// A radius of 0 copies the input unchanged.
    pub radius: u32,
    /// Standard deviation of the Gaussian. Must be finite and positive,
    /// and large enough that `2 * sigma²` is a normal `f32`.
    pub sigma: f32,
}

impl BlurParams {
    /// Largest accepted [`radius`](Self::radius).
    pub const MAX_RADIUS: u32 = 65_535;

    /// Check that a Gaussian window can be built from these parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `radius` exceeds
    /// [`MAX_RADIUS`](Self::MAX_RADIUS) or if `2 * sigma²` is not a normal
    /// positive number (zero, negative, non-finite, or so small that it
    /// underflows).
    pub fn check(self) -> Result<(), PipelineError> {
        if self.radius > Self::MAX_RADIUS {
            return Err(PipelineError::InvalidConfig(format!(
                "blur radius must be at most {}, got {}",
                Self::MAX_RADIUS,
                self.radius
            )));
        }
        let sigma = self.sigma;
        if !(sigma > 0.0 && (2.0 * sigma * sigma).is_normal()) {
            return Err(PipelineError::InvalidConfig(format!(
                "blur sigma must be finite and positive with a normal 2σ², got {sigma}"
            )));
        }
        Ok(())
    }
}

/// Parameters for one hatching pass.
///
/// The hatch line at normalized coordinates `(u, v)` is
/// `sin(a * u + b * v)`; it is "on" where that value exceeds `c`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HatchParams {
    /// Frequency along the horizontal axis.
    pub a: f32,
    /// Frequency along the vertical axis.
    pub b: f32,
    /// Cut-off the hatch line must exceed to be drawn.
    pub c: f32,
    /// Luminance threshold in `[0, 1]`.
    pub threshold: f32,
    /// Draw black lines over a white background instead of white lines
    /// over black.
    pub invert: bool,
}

impl HatchParams {
    /// Create hatch parameters.
    #[must_use]
    pub const fn new(a: f32, b: f32, c: f32, threshold: f32, invert: bool) -> Self {
        Self {
            a,
            b,
            c,
            threshold,
            invert,
        }
    }
}

/// Identifies one of the nine pipeline stage buffers.
///
/// Discriminants follow the stage numbering: 0 is the original snapshot,
/// 8 is the final composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StageId {
    /// Stage 0: snapshot of the source image.
    Original = 0,
    /// Stage 1: horizontal blur of the original.
    HorizontalBlur = 1,
    /// Stage 2: vertical blur of the horizontal result.
    VerticalBlur = 2,
    /// Stage 3: Sobel edges + binarization of the original.
    Edges = 3,
    /// Stage 4: first hatching pass over the blurred image.
    Hatch1 = 4,
    /// Stage 5: second hatching pass.
    Hatch2 = 5,
    /// Stage 6: third hatching pass.
    Hatch3 = 6,
    /// Stage 7: darkest-wins combination of the three hatches.
    CombinedHatch = 7,
    /// Stage 8: edges combined with the combined hatches.
    #[default]
    Final = 8,
}

impl StageId {
    /// All stages in pipeline order.
    pub const ALL: [Self; 9] = [
        Self::Original,
        Self::HorizontalBlur,
        Self::VerticalBlur,
        Self::Edges,
        Self::Hatch1,
        Self::Hatch2,
        Self::Hatch3,
        Self::CombinedHatch,
        Self::Final,
    ];

    /// Map a stage number to its stage.
    ///
    /// Numbers past the last stage select the original image.
    #[must_use]
    pub fn from_index(index: u8) -> Self {
        Self::ALL
            .get(usize::from(index))
            .copied()
            .unwrap_or(Self::Original)
    }

    /// Stage number (0-8).
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Human-readable description of the stage.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Original => "original image",
            Self::HorizontalBlur => "horizontal smoothing",
            Self::VerticalBlur => "horizontal + vertical smoothing",
            Self::Edges => "Sobel edges + binarization",
            Self::Hatch1 => "smoothing + hatching 1",
            Self::Hatch2 => "smoothing + hatching 2",
            Self::Hatch3 => "smoothing + hatching 3",
            Self::CombinedHatch => "smoothing + all three hatchings",
            Self::Final => "final sketch",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.index(), self.label())
    }
}

/// Configuration for one pipeline run.
///
/// Passed explicitly into every run; there is no ambient pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Blur applied in both the horizontal and vertical pass.
    pub blur: BlurParams,

    /// Sobel gradient magnitude at or above which a pixel becomes an
    /// (black) edge pixel.
    pub sobel_threshold: f32,

    /// The three hatching passes, applied to the blurred image.
    pub hatches: [HatchParams; 3],

    /// Which stage buffer [`process`](crate::process) returns.
    pub output: StageId,
}

impl PipelineConfig {
    /// Default blur radius in pixels.
    pub const DEFAULT_BLUR_RADIUS: u32 = 12;
    /// Default blur sigma (half the default radius).
    pub const DEFAULT_BLUR_SIGMA: f32 = 6.0;
    /// Default Sobel threshold.
    pub const DEFAULT_SOBEL_THRESHOLD: f32 = 0.3;
    /// Default hatching passes.
    pub const DEFAULT_HATCHES: [HatchParams; 3] = [
        HatchParams::new(400.0, 0.0, 0.99, 0.10, false),
        HatchParams::new(200.0, 200.0, 0.95, 0.25, true),
        HatchParams::new(250.0, -250.0, 0.90, 0.30, true),
    ];

    /// Check that every parameter is usable by the kernels.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the blur parameters fail
    /// [`BlurParams::check`], or if any threshold or hatch parameter is
    /// not finite.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.blur.check()?;
        if !self.sobel_threshold.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "sobel threshold must be finite, got {}",
                self.sobel_threshold
            )));
        }
        for (i, hatch) in self.hatches.iter().enumerate() {
            let finite = [hatch.a, hatch.b, hatch.c, hatch.threshold]
                .iter()
                .all(|v| v.is_finite());
            if !finite {
                return Err(PipelineError::InvalidConfig(format!(
                    "hatch {} has a non-finite parameter: {hatch:?}",
                    i + 1
                )));
            }
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur: BlurParams {
                radius: Self::DEFAULT_BLUR_RADIUS,
                sigma: Self::DEFAULT_BLUR_SIGMA,
            },
            sobel_threshold: Self::DEFAULT_SOBEL_THRESHOLD,
            hatches: Self::DEFAULT_HATCHES,
            output: StageId::default(),
        }
    }
}

/// Every buffer produced by one pipeline run.
///
/// Buffers stay behind `Arc` because each one was read concurrently by
/// the next stage's workers; they are immutable from here on.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Stage 0: snapshot of the source image.
    pub original: SharedImage,
    /// Stage 1: horizontal blur.
    pub horizontal: SharedImage,
    /// Stage 2: vertical blur of stage 1.
    pub vertical: SharedImage,
    /// Stage 3: binarized Sobel edges of the original.
    pub edges: SharedImage,
    /// Stages 4-6: the three hatching passes.
    pub hatches: [SharedImage; 3],
    /// Stage 7: combined hatches.
    pub combined_hatch: SharedImage,
    /// Stage 8: final composite.
    pub final_image: SharedImage,
    /// Dimensions shared by every buffer.
    pub dimensions: Dimensions,
}

impl StagedResult {
    /// The buffer produced by `stage`.
    #[must_use]
    pub fn stage(&self, stage: StageId) -> &SharedImage {
        match stage {
            StageId::Original => &self.original,
            StageId::HorizontalBlur => &self.horizontal,
            StageId::VerticalBlur => &self.vertical,
            StageId::Edges => &self.edges,
            StageId::Hatch1 => &self.hatches[0],
            StageId::Hatch2 => &self.hatches[1],
            StageId::Hatch3 => &self.hatches[2],
            StageId::CombinedHatch => &self.combined_hatch,
            StageId::Final => &self.final_image,
        }
    }
}

/// Errors that can occur while running kernels or the pipeline.
///
/// Any error leaves the caller's output buffer untouched: kernels only
/// write once every range of their fan-out has reported back.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Pipeline or kernel parameters are unusable.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// An input or output buffer has the wrong shape.
    #[error("buffer is {actual}, expected {expected}")]
    DimensionMismatch {
        /// Shape every buffer of the call must have.
        expected: Dimensions,
        /// Shape of the offending buffer.
        actual: Dimensions,
    },

    /// `combine` was called with an empty input list.
    #[error("combine requires at least one input buffer")]
    NoInputs,

    /// Some ranges of a fan-out never produced output (their task panicked).
    #[error("{kernel} fan-out incomplete: {missing} of {total} ranges missing")]
    Incomplete {
        /// Kernel whose fan-out failed.
        kernel: Kernel,
        /// Ranges without output.
        missing: usize,
        /// Ranges submitted.
        total: usize,
    },

    /// A named buffer does not exist in the pixel source.
    #[error("resource '{0}' not found")]
    MissingResource(String),

    /// Raw pixel data does not match its declared dimensions.
    #[error("pixel data is {actual} bytes, expected {expected}")]
    BufferSize {
        /// `width * height * 4`.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// The worker pool could not be started.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Ensure `image` has exactly `expected` dimensions.
pub(crate) fn expect_dimensions(
    image: &RgbaImage,
    expected: Dimensions,
) -> Result<(), PipelineError> {
    let actual = Dimensions::of(image);
    if actual == expected {
        Ok(())
    } else {
        Err(PipelineError::DimensionMismatch { expected, actual })
    }
}
