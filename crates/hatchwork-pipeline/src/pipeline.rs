//! The eight-stage sketch pipeline.
//!
//! ```text
//! 0 original ──┬─> 1 horizontal blur ─> 2 vertical blur ─┬─> 4 hatch 1 ─┐
//!              │                                         ├─> 5 hatch 2 ─┼─> 7 combined ─┐
//!              │                                         └─> 6 hatch 3 ─┘               ├─> 8 final
//!              └─> 3 Sobel edges ───────────────────────────────────────────────────────┘
//! ```
//!
//! Stages run strictly one after another. Each is a single fan-out on the
//! [`Sketcher`]'s pool that has fully completed before the next stage
//! starts, so a stage only ever reads buffers that are already frozen
//! behind an `Arc`.
//!
//! ```rust
//! # use hatchwork_pipeline::{PipelineConfig, PipelineError, RgbaImage, Sketcher};
//! # use hatchwork_pipeline::diagnostics::SystemClock;
//! # fn run(image: RgbaImage) -> Result<(), PipelineError> {
//! let sketcher = Sketcher::with_default_workers()?;
//! let (staged, diagnostics) =
//!     hatchwork_pipeline::pipeline::run(&sketcher, image, &PipelineConfig::default(), &SystemClock)?;
//! println!("{}", diagnostics.report());
//! let sketch = &staged.final_image;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::diagnostics::{
    Clock, PipelineDiagnostics, PipelineSummary, StageDiagnostics, StageMetrics,
    count_black_pixels,
};
use crate::pool::Kernel;
use crate::sketch::Sketcher;
use crate::types::{
    Dimensions, PipelineConfig, PipelineError, RgbaImage, SharedImage, StageId, StagedResult,
};

const HATCH_STAGES: [StageId; 3] = [StageId::Hatch1, StageId::Hatch2, StageId::Hatch3];

/// Run every stage on `original` and return all nine buffers together
/// with per-stage diagnostics.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// [`PipelineConfig::validate`], or the first kernel error of any stage.
/// Stages after a failing one do not run.
pub fn run<C: Clock>(
    sketcher: &Sketcher,
    original: RgbaImage,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    config.validate()?;
    let dims = Dimensions::of(&original);
    let tasks = sketcher.workers().get();
    let submitted_before = sketcher.pool().stats().submitted;
    let pixel_count = dims.pixel_count() as u64;
    log::debug!("sketching {dims} image on {tasks} workers");
    let pipeline_start = clock.now();

    // ───────────────────────── Stage 0: snapshot ─────────────────────────

    let start = clock.now();
    let original: SharedImage = Arc::new(original);
    let original_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Snapshot {
            width: dims.width,
            height: dims.height,
            pixel_count,
        },
    };

    // ─────────────────────── Stages 1-2: smoothing ───────────────────────

    let blur_metrics = |kernel| StageMetrics::Blur {
        kernel,
        radius: config.blur.radius,
        sigma: config.blur.sigma,
        tasks,
    };

    let (horizontal, duration) = run_stage(clock, StageId::HorizontalBlur, dims, |out| {
        sketcher.blur_horizontal(&original, out, config.blur)
    })?;
    let horizontal_diag = StageDiagnostics {
        duration,
        metrics: blur_metrics(Kernel::HorizontalBlur),
    };

    let (vertical, duration) = run_stage(clock, StageId::VerticalBlur, dims, |out| {
        sketcher.blur_vertical(&horizontal, out, config.blur)
    })?;
    let vertical_diag = StageDiagnostics {
        duration,
        metrics: blur_metrics(Kernel::VerticalBlur),
    };

    // ───────────────────────── Stage 3: edges ────────────────────────────

    let (edges, duration) = run_stage(clock, StageId::Edges, dims, |out| {
        sketcher.edge_binarize(&original, out, config.sobel_threshold)
    })?;
    let edges_diag = StageDiagnostics {
        duration,
        metrics: StageMetrics::EdgeDetection {
            threshold: config.sobel_threshold,
            tasks,
            black_pixel_count: count_black_pixels(&edges),
            total_pixel_count: pixel_count,
        },
    };

    // ──────────────────────── Stages 4-6: hatching ───────────────────────

    let hatch = |i: usize| -> Result<(SharedImage, StageDiagnostics), PipelineError> {
        let params = config.hatches[i];
        let (image, duration) = run_stage(clock, HATCH_STAGES[i], dims, |out| {
            sketcher.hatch(&vertical, out, params)
        })?;
        let metrics = StageMetrics::Hatch {
            a: params.a,
            b: params.b,
            c: params.c,
            threshold: params.threshold,
            invert: params.invert,
            tasks,
            black_pixel_count: count_black_pixels(&image),
        };
        Ok((image, StageDiagnostics { duration, metrics }))
    };
    let (hatch1, hatch1_diag) = hatch(0)?;
    let (hatch2, hatch2_diag) = hatch(1)?;
    let (hatch3, hatch3_diag) = hatch(2)?;
    let hatches = [hatch1, hatch2, hatch3];

    // ────────────────────── Stages 7-8: combination ──────────────────────

    let (combined_hatch, duration) = run_stage(clock, StageId::CombinedHatch, dims, |out| {
        sketcher.combine(&hatches, out)
    })?;
    let combined_diag = StageDiagnostics {
        duration,
        metrics: StageMetrics::Combine {
            inputs: hatches.len(),
            tasks,
            black_pixel_count: count_black_pixels(&combined_hatch),
        },
    };

    let final_inputs = [Arc::clone(&edges), Arc::clone(&combined_hatch)];
    let (final_image, duration) = run_stage(clock, StageId::Final, dims, |out| {
        sketcher.combine(&final_inputs, out)
    })?;
    let final_black_pixel_count = count_black_pixels(&final_image);
    let final_diag = StageDiagnostics {
        duration,
        metrics: StageMetrics::Combine {
            inputs: final_inputs.len(),
            tasks,
            black_pixel_count: final_black_pixel_count,
        },
    };

    let total_duration = clock.elapsed(&pipeline_start);
    let tasks_submitted = sketcher.pool().stats().submitted - submitted_before;
    log::debug!(
        "sketch finished in {:.3}ms ({tasks_submitted} tasks)",
        total_duration.as_secs_f64() * 1000.0
    );

    let staged = StagedResult {
        original,
        horizontal,
        vertical,
        edges,
        hatches,
        combined_hatch,
        final_image,
        dimensions: dims,
    };
    let diagnostics = PipelineDiagnostics {
        original: original_diag,
        horizontal_blur: horizontal_diag,
        vertical_blur: vertical_diag,
        edges: edges_diag,
        hatches: [hatch1_diag, hatch2_diag, hatch3_diag],
        combined_hatch: combined_diag,
        final_image: final_diag,
        total_duration,
        summary: PipelineSummary {
            image_width: dims.width,
            image_height: dims.height,
            pixel_count,
            workers: tasks,
            tasks_submitted,
            final_black_pixel_count,
        },
    };
    Ok((staged, diagnostics))
}

/// Allocate a fresh output buffer, run one kernel into it and freeze it.
fn run_stage<C, F>(
    clock: &C,
    stage: StageId,
    dims: Dimensions,
    kernel: F,
) -> Result<(SharedImage, Duration), PipelineError>
where
    C: Clock,
    F: FnOnce(&mut RgbaImage) -> Result<(), PipelineError>,
{
    log::debug!("stage {stage}: start");
    let start = clock.now();
    let mut output = RgbaImage::new(dims.width, dims.height);
    if let Err(e) = kernel(&mut output) {
        log::error!("stage {stage} failed: {e}");
        return Err(e);
    }
    let duration = clock.elapsed(&start);
    log::debug!(
        "stage {stage}: done in {:.3}ms",
        duration.as_secs_f64() * 1000.0
    );
    Ok((Arc::new(output), duration))
}
