//! Splitting an image domain into one contiguous range per worker.
//!
//! The same scheme serves every kernel: rows for the Sobel and horizontal
//! blur passes, columns for the vertical blur, and flattened pixel indices
//! for hatching and combining.

use std::num::NonZeroUsize;
use std::ops::Range;

use crate::types::Dimensions;

/// Which index space a fan-out partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// `0..height`.
    Rows,
    /// `0..width`.
    Columns,
    /// `0..width * height`.
    Pixels,
}

impl Axis {
    /// Size of this index space for an image of `dims`.
    #[must_use]
    pub const fn extent(self, dims: Dimensions) -> usize {
        match self {
            Self::Rows => dims.height as usize,
            Self::Columns => dims.width as usize,
            Self::Pixels => dims.pixel_count(),
        }
    }
}

/// Split `extent` into `parts` contiguous ranges of `len / parts` items,
/// the last range running to `extent.end` to absorb the remainder.
///
/// The ranges are disjoint, ordered, and cover `extent` exactly. When
/// there are fewer items than parts, the leading ranges are empty.
#[must_use]
pub fn split(extent: Range<usize>, parts: NonZeroUsize) -> Vec<Range<usize>> {
    let parts = parts.get();
    let chunk = extent.end.saturating_sub(extent.start) / parts;
    (0..parts)
        .map(|t| {
            let start = extent.start + t * chunk;
            let end = if t == parts - 1 {
                extent.end
            } else {
                start + chunk
            };
            start..end
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    /// Disjoint, contiguous, exhaustive, remainder on the last range.
    fn assert_well_formed(extent: Range<usize>, parts: usize, ranges: &[Range<usize>]) {
        assert_eq!(ranges.len(), parts);
        assert_eq!(ranges[0].start, extent.start);
        assert_eq!(ranges[parts - 1].end, extent.end);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "gap or overlap in {ranges:?}");
        }
        let chunk = extent.len() / parts;
        for r in &ranges[..parts - 1] {
            assert_eq!(r.len(), chunk);
        }
        assert_eq!(ranges[parts - 1].len(), chunk + extent.len() % parts);
        let covered: usize = ranges.iter().map(ExactSizeIterator::len).sum();
        assert_eq!(covered, extent.len());
    }

    #[test]
    fn even_split() {
        let ranges = split(0..12, nz(4));
        assert_eq!(ranges, vec![0..3, 3..6, 6..9, 9..12]);
    }

    #[test]
    fn remainder_goes_to_last() {
        let ranges = split(0..10, nz(3));
        assert_eq!(ranges, vec![0..3, 3..6, 6..10]);
    }

    #[test]
    fn offset_start() {
        let ranges = split(5..15, nz(4));
        assert_eq!(ranges, vec![5..7, 7..9, 9..11, 11..15]);
    }

    #[test]
    fn more_parts_than_items() {
        let ranges = split(0..2, nz(5));
        assert_eq!(ranges, vec![0..0, 0..0, 0..0, 0..0, 0..2]);
    }

    #[test]
    fn single_part_is_whole_extent() {
        assert_eq!(split(0..7, nz(1)), vec![0..7]);
    }

    #[test]
    fn empty_extent() {
        let ranges = split(0..0, nz(3));
        assert!(ranges.iter().all(|r| r.is_empty()));
        assert_eq!(ranges.len(), 3);
    }

    #[test]
    fn well_formed_for_all_shapes() {
        for width in 1..=9_u32 {
            for height in 1..=9_u32 {
                let dims = Dimensions::new(width, height);
                for workers in 1..=12 {
                    for axis in [Axis::Rows, Axis::Columns, Axis::Pixels] {
                        let extent = 0..axis.extent(dims);
                        let ranges = split(extent.clone(), nz(workers));
                        assert_well_formed(extent, workers, &ranges);
                    }
                }
            }
        }
    }

    #[test]
    fn axis_extents() {
        let dims = Dimensions::new(7, 3);
        assert_eq!(Axis::Rows.extent(dims), 3);
        assert_eq!(Axis::Columns.extent(dims), 7);
        assert_eq!(Axis::Pixels.extent(dims), 21);
    }
}
