//! hatchwork-bench: CLI tool for running the sketch pipeline on image files.
//!
//! Loads an image, runs the worker-pool sketch pipeline on it with
//! configurable parameters, writes the selected stage back to disk, and
//! prints detailed per-stage diagnostics. Useful for:
//!
//! - Tuning blur radius/sigma and the Sobel threshold
//! - Measuring per-stage durations across worker counts
//! - Inspecting any of the nine intermediate stages
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin hatchwork-bench -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Set `RUST_LOG=debug` to trace stage boundaries.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use hatchwork_pipeline::{
    BlurParams, Dimensions, PipelineConfig, PipelineDiagnostics, PixelStore, RgbaImage, Sketcher,
    StageId, SystemClock,
};
use image::{DynamicImage, ImageFormat};

/// Handle the decoded image is registered under.
const INPUT_HANDLE: &str = "input";

/// Handle the selected stage is written to.
const OUTPUT_HANDLE: &str = "output";

/// Pencil-sketch pipeline runner and diagnostics for hatchwork.
///
/// Runs the sketch pipeline on a given image with configurable
/// parameters, writes the selected stage, and prints per-stage timing.
#[derive(Parser)]
#[command(name = "hatchwork-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP).
    image_path: PathBuf,

    /// Where to write the selected stage. Defaults to
    /// `sketch_<stage>_<stem>.<ext>` next to the input.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Stage to write: 0 original, 1-2 blur, 3 edges, 4-6 hatchings,
    /// 7 combined hatchings, 8 final (default). Larger numbers select the
    /// original. Also applies on top of `--config-json`.
    #[arg(long)]
    stage: Option<u8>,

    /// Gaussian blur radius in pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_RADIUS)]
    radius: u32,

    /// Gaussian blur sigma.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_SIGMA)]
    sigma: f32,

    /// Sobel gradient magnitude at which a pixel becomes an edge.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SOBEL_THRESHOLD)]
    sobel_threshold: f32,

    /// Worker threads (default: hardware concurrency).
    #[arg(long)]
    workers: Option<NonZeroUsize>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags except `--stage`
    /// are ignored. The JSON must be a valid `PipelineConfig`
    /// serialization; missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual parameter flags are ignored, except for an explicit
/// `--stage`, which overrides the JSON `output`.  Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    let mut config: PipelineConfig = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        PipelineConfig {
            blur: BlurParams {
                radius: cli.radius,
                sigma: cli.sigma,
            },
            sobel_threshold: cli.sobel_threshold,
            ..PipelineConfig::default()
        }
    };
    if let Some(stage) = cli.stage {
        config.output = StageId::from_index(stage);
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// `sketch_<stage>_<stem>.<ext>` next to `input`, keeping the input's
/// format when it is one we can write.
fn default_output_path(input: &Path, stage: StageId) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| matches!(e.as_str(), "png" | "jpg" | "jpeg" | "bmp"))
        .unwrap_or_else(|| "png".to_owned());
    input.with_file_name(format!("sketch_{}_{stem}.{ext}", stage.index()))
}

/// Write `image` in the format implied by `path`. JPEG has no alpha
/// channel, so it is dropped first.
fn save_image(image: RgbaImage, path: &Path) -> Result<(), image::ImageError> {
    let format = ImageFormat::from_path(path)?;
    if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgba8(image)
            .to_rgb8()
            .save_with_format(path, format)
    } else {
        image.save_with_format(path, format)
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image = match image::open(&cli.image_path) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    let dims = Dimensions::of(&image);

    let sketcher = match cli.workers.map_or_else(Sketcher::with_default_workers, Sketcher::new) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error starting worker pool: {e}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Image: {} ({dims})", cli.image_path.display());
    eprintln!("Workers: {}", sketcher.workers());
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut source = PixelStore::new();
    source.insert(INPUT_HANDLE, image);

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let mut sink = PixelStore::new();
        match hatchwork_pipeline::process_surfaces(
            &sketcher,
            &source,
            &mut sink,
            INPUT_HANDLE,
            OUTPUT_HANDLE,
            dims,
            &config,
            &SystemClock,
        ) {
            Ok(diagnostics) => {
                log::debug!(
                    "run {} finished in {:?} ({} tasks)",
                    run + 1,
                    diagnostics.total_duration,
                    diagnostics.summary.tasks_submitted,
                );
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write the selected stage on the first run only.
                if run == 0
                    && let Some(sketch) = sink.take(OUTPUT_HANDLE)
                {
                    let path = cli
                        .output
                        .clone()
                        .unwrap_or_else(|| default_output_path(&cli.image_path, config.output));
                    match save_image(sketch, &path) {
                        Ok(()) => eprintln!("Stage {} written to {}", config.output, path.display()),
                        Err(e) => {
                            eprintln!("Error writing {}: {e}", path.display());
                            return ExitCode::FAILURE;
                        }
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means.
    println!();
    println!("{:<36} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(50));

    for stage in StageId::ALL {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| d.stage(stage).duration.as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{:<36} {stage_mean:>10.3}ms", stage.to_string());
    }
}
