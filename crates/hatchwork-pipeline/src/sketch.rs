//! Kernel invocation surface: one fan-out per call, closed by a barrier.
//!
//! Every [`Sketcher`] method partitions its domain with
//! [`partition::split`], submits one task per range to the pool, and waits
//! on [`TaskPool::barrier`]. Each task computes the bytes for its range into
//! a private stripe; nothing touches the caller's output buffer until every
//! stripe has reported back with the expected length. A failed call
//! therefore leaves the output exactly as it was.

use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError};

use crate::partition::{self, Axis};
use crate::pool::{Kernel, PoolError, TaskPool};
use crate::types::{
    BlurParams, CHANNELS, Dimensions, HatchParams, PipelineError, RgbaImage, SharedImage,
    expect_dimensions,
};
use crate::{blur, combine, edge, hatch};

/// A completed fan-out: each range with the bytes its task produced.
type Stripes = Vec<(Range<usize>, Vec<u8>)>;

/// Runs pixel kernels on a worker pool.
#[derive(Debug)]
pub struct Sketcher {
    pool: TaskPool,
}

impl Sketcher {
    /// Start a sketcher with `workers` pool threads.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a worker thread cannot be started.
    pub fn new(workers: NonZeroUsize) -> Result<Self, PoolError> {
        Ok(Self {
            pool: TaskPool::new(workers)?,
        })
    }

    /// Start a sketcher sized to the machine's hardware concurrency.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a worker thread cannot be started.
    pub fn with_default_workers() -> Result<Self, PoolError> {
        Ok(Self {
            pool: TaskPool::with_default_workers()?,
        })
    }

    /// The underlying worker pool.
    #[must_use]
    pub const fn pool(&self) -> &TaskPool {
        &self.pool
    }

    /// Number of ranges each fan-out is split into.
    #[must_use]
    pub const fn workers(&self) -> NonZeroUsize {
        self.pool.workers()
    }

    /// Sobel edge detection + binarization of `input` into `output`.
    ///
    /// Partitioned by rows.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DimensionMismatch`] if `output` is not the same
    /// size as `input`; [`PipelineError::Incomplete`] if a task failed.
    pub fn edge_binarize(
        &self,
        input: &SharedImage,
        output: &mut RgbaImage,
        threshold: f32,
    ) -> Result<(), PipelineError> {
        let dims = Dimensions::of(input);
        expect_dimensions(output, dims)?;
        let (width, height) = (dims.width as usize, dims.height as usize);
        let source = Arc::clone(input);
        let stripes = self.fan_out(Kernel::SobelBinaryEdge, Axis::Rows.extent(dims), move |rows| {
            edge::sobel_rows(source.as_raw(), width, height, rows, threshold)
        })?;
        write_contiguous(output, &stripes, width * CHANNELS)
    }

    /// Horizontal Gaussian pass of `input` into `output`.
    ///
    /// Partitioned by rows.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidConfig`] for a non-positive sigma,
    /// [`PipelineError::DimensionMismatch`] for a mis-sized `output`, and
    /// [`PipelineError::Incomplete`] if a task failed.
    pub fn blur_horizontal(
        &self,
        input: &SharedImage,
        output: &mut RgbaImage,
        params: BlurParams,
    ) -> Result<(), PipelineError> {
        let weights = Arc::new(blur::gaussian_weights(params)?);
        let dims = Dimensions::of(input);
        expect_dimensions(output, dims)?;
        let width = dims.width as usize;
        let source = Arc::clone(input);
        let stripes = self.fan_out(Kernel::HorizontalBlur, Axis::Rows.extent(dims), move |rows| {
            blur::horizontal_rows(source.as_raw(), width, rows, &weights)
        })?;
        write_contiguous(output, &stripes, width * CHANNELS)
    }

    /// Vertical Gaussian pass of `input` into `output`.
    ///
    /// Partitioned by columns.
    ///
    /// # Errors
    ///
    /// Same as [`blur_horizontal`](Self::blur_horizontal).
    pub fn blur_vertical(
        &self,
        input: &SharedImage,
        output: &mut RgbaImage,
        params: BlurParams,
    ) -> Result<(), PipelineError> {
        let weights = Arc::new(blur::gaussian_weights(params)?);
        let dims = Dimensions::of(input);
        expect_dimensions(output, dims)?;
        let (width, height) = (dims.width as usize, dims.height as usize);
        let source = Arc::clone(input);
        let stripes = self.fan_out(
            Kernel::VerticalBlur,
            Axis::Columns.extent(dims),
            move |columns| blur::vertical_columns(source.as_raw(), width, height, columns, &weights),
        )?;
        write_columns(output, &stripes, dims)
    }

    /// Hatching of `input` into `output`.
    ///
    /// Partitioned by flattened pixel index.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DimensionMismatch`] for a mis-sized `output`;
    /// [`PipelineError::Incomplete`] if a task failed.
    pub fn hatch(
        &self,
        input: &SharedImage,
        output: &mut RgbaImage,
        params: HatchParams,
    ) -> Result<(), PipelineError> {
        let dims = Dimensions::of(input);
        expect_dimensions(output, dims)?;
        let (width, height) = (dims.width as usize, dims.height as usize);
        let source = Arc::clone(input);
        let stripes = self.fan_out(Kernel::Hatching, Axis::Pixels.extent(dims), move |pixels| {
            hatch::hatch_pixels(source.as_raw(), width, height, pixels, &params)
        })?;
        write_contiguous(output, &stripes, CHANNELS)
    }

    /// Darkest-wins combination of `inputs` into `output`.
    ///
    /// Partitioned by flattened pixel index.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NoInputs`] for an empty input list,
    /// [`PipelineError::DimensionMismatch`] if the inputs and `output` do
    /// not all share one size, and [`PipelineError::Incomplete`] if a task
    /// failed.
    pub fn combine(
        &self,
        inputs: &[SharedImage],
        output: &mut RgbaImage,
    ) -> Result<(), PipelineError> {
        let first = inputs.first().ok_or(PipelineError::NoInputs)?;
        let dims = Dimensions::of(first);
        for input in &inputs[1..] {
            expect_dimensions(input, dims)?;
        }
        expect_dimensions(output, dims)?;
        let sources: Arc<[SharedImage]> = inputs.into();
        let stripes = self.fan_out(Kernel::CombineImages, Axis::Pixels.extent(dims), move |pixels| {
            combine::min_pixels(&sources[..], pixels)
        })?;
        write_contiguous(output, &stripes, CHANNELS)
    }

    /// Split `0..extent` across the workers, run `work` on each range in
    /// the pool and wait for all of them.
    fn fan_out<F>(&self, kernel: Kernel, extent: usize, work: F) -> Result<Stripes, PipelineError>
    where
        F: Fn(Range<usize>) -> Vec<u8> + Send + Sync + 'static,
    {
        let ranges = partition::split(0..extent, self.pool.workers());
        let total = ranges.len();
        let slots: Arc<Mutex<Vec<Option<Vec<u8>>>>> = Arc::new(Mutex::new(vec![None; total]));
        let work = Arc::new(work);

        for (index, range) in ranges.iter().cloned().enumerate() {
            let slots = Arc::clone(&slots);
            let work = Arc::clone(&work);
            self.pool.submit(kernel, move || {
                let stripe = work(range);
                slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(stripe);
            });
        }
        self.pool.barrier();

        let stripes = std::mem::take(&mut *slots.lock().unwrap_or_else(PoisonError::into_inner));
        let missing = stripes.iter().filter(|s| s.is_none()).count();
        if missing > 0 {
            log::error!("{kernel}: {missing} of {total} ranges produced no output");
            return Err(PipelineError::Incomplete {
                kernel,
                missing,
                total,
            });
        }
        log::trace!("{kernel}: {total} ranges over 0..{extent}");
        Ok(ranges.into_iter().zip(stripes.into_iter().flatten()).collect())
    }
}

/// Copy stripes whose ranges index contiguous `unit`-byte spans of the
/// output (rows or pixels).
fn write_contiguous(
    output: &mut RgbaImage,
    stripes: &[(Range<usize>, Vec<u8>)],
    unit: usize,
) -> Result<(), PipelineError> {
    for (range, bytes) in stripes {
        check_stripe(range.len() * unit, bytes)?;
    }
    let raw: &mut [u8] = output;
    for (range, bytes) in stripes {
        raw[range.start * unit..range.end * unit].copy_from_slice(bytes);
    }
    Ok(())
}

/// Scatter column blocks (see [`blur::vertical_columns`]) into the output
/// one row at a time.
fn write_columns(
    output: &mut RgbaImage,
    stripes: &[(Range<usize>, Vec<u8>)],
    dims: Dimensions,
) -> Result<(), PipelineError> {
    let (width, height) = (dims.width as usize, dims.height as usize);
    for (range, bytes) in stripes {
        check_stripe(height * range.len() * CHANNELS, bytes)?;
    }
    let raw: &mut [u8] = output;
    for (columns, bytes) in stripes {
        let block_row = columns.len() * CHANNELS;
        if block_row == 0 {
            continue;
        }
        for (y, row) in bytes.chunks_exact(block_row).enumerate() {
            let start = (y * width + columns.start) * CHANNELS;
            raw[start..start + block_row].copy_from_slice(row);
        }
    }
    Ok(())
}

fn check_stripe(expected: usize, bytes: &[u8]) -> Result<(), PipelineError> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(PipelineError::BufferSize {
            expected,
            actual: bytes.len(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::edge::{BLACK, WHITE};

    fn sketcher(workers: usize) -> Sketcher {
        Sketcher::new(NonZeroUsize::new(workers).unwrap()).unwrap()
    }

    fn shared(img: RgbaImage) -> SharedImage {
        Arc::new(img)
    }

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            image::Rgba([(x * 19 % 256) as u8, (y * 23 % 256) as u8, ((x * y) % 256) as u8, 255])
        })
    }

    /// Reference result computed by a single call over the whole domain.
    fn serial_vertical(img: &RgbaImage, params: BlurParams) -> Vec<u8> {
        let weights = blur::gaussian_weights(params).unwrap();
        let (w, h) = (img.width() as usize, img.height() as usize);
        blur::vertical_columns(img.as_raw(), w, h, 0..w, &weights)
    }

    #[test]
    fn uniform_black_edges_are_white() {
        let s = sketcher(3);
        let input = shared(RgbaImage::from_pixel(4, 4, image::Rgba(BLACK)));
        let mut output = RgbaImage::new(4, 4);
        s.edge_binarize(&input, &mut output, 0.1).unwrap();
        assert!(output.pixels().all(|p| p.0 == WHITE));
    }

    #[test]
    fn red_green_combine_is_black() {
        let s = sketcher(2);
        let a = shared(RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255])));
        let b = shared(RgbaImage::from_pixel(2, 2, image::Rgba([0, 255, 0, 255])));
        let mut output = RgbaImage::new(2, 2);
        s.combine(&[a, b], &mut output).unwrap();
        assert!(output.pixels().all(|p| p.0 == BLACK));
    }

    #[test]
    fn result_is_independent_of_worker_count() {
        let input = shared(gradient(13, 11));
        let params = BlurParams {
            radius: 3,
            sigma: 1.5,
        };
        let mut reference: Option<(RgbaImage, RgbaImage, RgbaImage)> = None;
        for workers in [1, 2, 3, 5, 8, 16] {
            let s = sketcher(workers);
            let mut h = RgbaImage::new(13, 11);
            let mut v = RgbaImage::new(13, 11);
            let mut e = RgbaImage::new(13, 11);
            s.blur_horizontal(&input, &mut h, params).unwrap();
            s.blur_vertical(&input, &mut v, params).unwrap();
            s.edge_binarize(&input, &mut e, 0.2).unwrap();
            match &reference {
                None => reference = Some((h, v, e)),
                Some((rh, rv, re)) => {
                    assert_eq!(&h, rh, "horizontal, {workers} workers");
                    assert_eq!(&v, rv, "vertical, {workers} workers");
                    assert_eq!(&e, re, "edges, {workers} workers");
                }
            }
        }
    }

    #[test]
    fn vertical_scatter_matches_serial() {
        let img = gradient(10, 7);
        let params = BlurParams {
            radius: 2,
            sigma: 1.0,
        };
        let expected = serial_vertical(&img, params);
        let s = sketcher(4);
        let mut output = RgbaImage::new(10, 7);
        s.blur_vertical(&shared(img), &mut output, params).unwrap();
        assert_eq!(output.as_raw(), &expected);
    }

    #[test]
    fn zero_radius_blur_is_identity() {
        let img = gradient(9, 5);
        let input = shared(img.clone());
        let params = BlurParams {
            radius: 0,
            sigma: 1.0,
        };
        let s = sketcher(4);
        let mut output = RgbaImage::new(9, 5);
        s.blur_horizontal(&input, &mut output, params).unwrap();
        assert_eq!(output, img);
        s.blur_vertical(&input, &mut output, params).unwrap();
        assert_eq!(output, img);
    }

    #[test]
    fn hatch_fills_every_pixel() {
        let s = sketcher(3);
        let input = shared(gradient(7, 5));
        // Sentinel values that no hatch pixel can take.
        let mut output = RgbaImage::from_pixel(7, 5, image::Rgba([1, 2, 3, 4]));
        s.hatch(&input, &mut output, HatchParams::new(200.0, 200.0, 0.95, 0.25, true))
            .unwrap();
        assert!(output.pixels().all(|p| p.0 == BLACK || p.0 == WHITE));
    }

    #[test]
    fn more_workers_than_rows() {
        let s = sketcher(8);
        let input = shared(gradient(3, 2));
        let mut output = RgbaImage::new(3, 2);
        s.edge_binarize(&input, &mut output, 0.3).unwrap();
        let mut serial = RgbaImage::new(3, 2);
        sketcher(1).edge_binarize(&input, &mut serial, 0.3).unwrap();
        assert_eq!(output, serial);
    }

    #[test]
    fn mismatched_output_is_left_untouched() {
        let s = sketcher(2);
        let input = shared(gradient(4, 4));
        let sentinel = image::Rgba([9, 9, 9, 9]);
        let mut output = RgbaImage::from_pixel(4, 3, sentinel);
        let err = s.edge_binarize(&input, &mut output, 0.3).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
        assert!(output.pixels().all(|p| *p == sentinel));
    }

    #[test]
    fn invalid_sigma_is_left_untouched() {
        let s = sketcher(2);
        let input = shared(gradient(4, 4));
        let sentinel = image::Rgba([7, 7, 7, 7]);
        let mut output = RgbaImage::from_pixel(4, 4, sentinel);
        let params = BlurParams {
            radius: 2,
            sigma: 0.0,
        };
        let err = s.blur_horizontal(&input, &mut output, params).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        assert!(output.pixels().all(|p| *p == sentinel));
        assert_eq!(s.pool().stats().submitted, 0, "nothing was fanned out");
    }

    #[test]
    fn combine_rejects_empty_and_mismatched_inputs() {
        let s = sketcher(2);
        let mut output = RgbaImage::new(2, 2);
        assert!(matches!(
            s.combine(&[], &mut output),
            Err(PipelineError::NoInputs)
        ));
        let a = shared(RgbaImage::new(2, 2));
        let b = shared(RgbaImage::new(3, 2));
        assert!(matches!(
            s.combine(&[a, b], &mut output),
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn one_task_per_worker() {
        let s = sketcher(4);
        let input = shared(gradient(8, 8));
        let mut output = RgbaImage::new(8, 8);
        s.hatch(&input, &mut output, HatchParams::new(400.0, 0.0, 0.99, 0.1, false))
            .unwrap();
        let stats = s.pool().stats();
        assert_eq!(stats.submitted, 4);
        assert_eq!(stats.completed, 4);
    }

    #[test]
    fn empty_image_is_a_no_op() {
        let s = sketcher(3);
        let input = shared(RgbaImage::new(0, 0));
        let mut output = RgbaImage::new(0, 0);
        s.edge_binarize(&input, &mut output, 0.3).unwrap();
        s.blur_vertical(
            &input,
            &mut output,
            BlurParams {
                radius: 2,
                sigma: 1.0,
            },
        )
        .unwrap();
        s.combine(&[Arc::clone(&input)], &mut output).unwrap();
    }

    #[test]
    fn stripe_length_is_checked_before_writing() {
        let mut output = RgbaImage::from_pixel(2, 1, image::Rgba([5, 5, 5, 5]));
        let stripes = vec![(0..1, vec![0; 4]), (1..2, vec![0; 3])];
        let err = write_contiguous(&mut output, &stripes, CHANNELS).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BufferSize {
                expected: 4,
                actual: 3
            }
        ));
        assert!(output.pixels().all(|p| p.0 == [5, 5, 5, 5]));
    }
}
