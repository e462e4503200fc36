//! Pipeline diagnostics: timing, task counts, and ink coverage for each
//! stage.
//!
//! Every call to [`pipeline::run`](crate::pipeline::run) collects these
//! alongside the stage buffers. Timing goes through the [`Clock`] trait so
//! the host decides where timestamps come from; [`SystemClock`] is the
//! `std::time::Instant` implementation used by [`process`](crate::process).
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::pool::Kernel;
use crate::types::{RgbaImage, StageId};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time passed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 0: snapshot of the source image.
    pub original: StageDiagnostics,
    /// Stage 1: horizontal blur.
    pub horizontal_blur: StageDiagnostics,
    /// Stage 2: vertical blur.
    pub vertical_blur: StageDiagnostics,
    /// Stage 3: Sobel edges + binarization.
    pub edges: StageDiagnostics,
    /// Stages 4-6: hatching passes.
    pub hatches: [StageDiagnostics; 3],
    /// Stage 7: combined hatches.
    pub combined_hatch: StageDiagnostics,
    /// Stage 8: final composite.
    pub final_image: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Source snapshot.
    Snapshot {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// One Gaussian pass.
    Blur {
        /// Which pass ran.
        kernel: Kernel,
        /// Window half-width.
        radius: u32,
        /// Gaussian sigma.
        sigma: f32,
        /// Ranges fanned out.
        tasks: usize,
    },
    /// Sobel edge detection + binarization.
    EdgeDetection {
        /// Gradient magnitude threshold.
        threshold: f32,
        /// Ranges fanned out.
        tasks: usize,
        /// Black (edge) pixels in the output.
        black_pixel_count: u64,
        /// Total pixel count for computing edge density.
        total_pixel_count: u64,
    },
    /// One hatching pass.
    Hatch {
        /// Horizontal line frequency.
        a: f32,
        /// Vertical line frequency.
        b: f32,
        /// Line cut-off.
        c: f32,
        /// Luminance threshold.
        threshold: f32,
        /// Whether the inverted truth table was used.
        invert: bool,
        /// Ranges fanned out.
        tasks: usize,
        /// Black pixels in the output.
        black_pixel_count: u64,
    },
    /// Darkest-wins combination.
    Combine {
        /// Number of buffers combined.
        inputs: usize,
        /// Ranges fanned out.
        tasks: usize,
        /// Black pixels in the output.
        black_pixel_count: u64,
    },
}

/// High-level summary counts for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Worker threads in the pool.
    pub workers: usize,
    /// Tasks submitted to the pool during this run.
    pub tasks_submitted: u64,
    /// Black pixels in the final image.
    pub final_black_pixel_count: u64,
}

impl PipelineDiagnostics {
    /// Diagnostics for one stage.
    #[must_use]
    pub const fn stage(&self, stage: StageId) -> &StageDiagnostics {
        match stage {
            StageId::Original => &self.original,
            StageId::HorizontalBlur => &self.horizontal_blur,
            StageId::VerticalBlur => &self.vertical_blur,
            StageId::Edges => &self.edges,
            StageId::Hatch1 => &self.hatches[0],
            StageId::Hatch2 => &self.hatches[1],
            StageId::Hatch3 => &self.hatches[2],
            StageId::CombinedHatch => &self.combined_hatch,
            StageId::Final => &self.final_image,
        }
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Workers: {}  |  Tasks: {}",
            self.summary.workers, self.summary.tasks_submitted,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<36} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(96));

        let total_ms = duration_ms(self.total_duration);
        for stage in StageId::ALL {
            let diag = self.stage(stage);
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let name = stage.to_string();
            let details = format_metrics(&diag.metrics, self.summary.pixel_count);
            lines.push(format!("{name:<36} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Final ink: {} pixels ({:.1}%)",
            self.summary.final_black_pixel_count,
            percent(self.summary.final_black_pixel_count, self.summary.pixel_count),
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics, pixel_count: u64) -> String {
    match metrics {
        StageMetrics::Snapshot {
            width,
            height,
            pixel_count,
        } => format!("{width}x{height} ({pixel_count} px)"),
        StageMetrics::Blur {
            kernel,
            radius,
            sigma,
            tasks,
        } => format!("{kernel} r={radius} sigma={sigma:.2} tasks={tasks}"),
        StageMetrics::EdgeDetection {
            threshold,
            tasks,
            black_pixel_count,
            total_pixel_count,
        } => format!(
            "t={threshold:.2} tasks={tasks} edges={black_pixel_count} ({:.1}%)",
            percent(*black_pixel_count, *total_pixel_count),
        ),
        StageMetrics::Hatch {
            a,
            b,
            c,
            threshold,
            invert,
            tasks,
            black_pixel_count,
        } => format!(
            "a={a} b={b} c={c:.2} t={threshold:.2}{} tasks={tasks} ink={:.1}%",
            if *invert { " inv" } else { "" },
            percent(*black_pixel_count, pixel_count),
        ),
        StageMetrics::Combine {
            inputs,
            tasks,
            black_pixel_count,
        } => format!(
            "{inputs} inputs tasks={tasks} ink={:.1}%",
            percent(*black_pixel_count, pixel_count),
        ),
    }
}

/// Count pure black pixels (RGB all zero) in an image.
pub(crate) fn count_black_pixels(image: &RgbaImage) -> u64 {
    image
        .pixels()
        .map(|p| u64::from(u8::from(p.0[..3] == [0, 0, 0])))
        .sum()
}
