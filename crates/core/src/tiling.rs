//! Raster-scan tile extraction and the matching count oracle.
//!
//! Extraction is deliberately lenient: a trailing strip narrower than
//! the window is simply never visited. The on-disk export path layers a
//! strict divisibility check on top via [`validate_exact_tiling`]; the
//! two contracts are distinct operations on purpose.

use ndarray::{s, Array4, ArrayView3};

use crate::error::{Error, Result};
use crate::types::CHANNELS;

/// Cut a square image into an ordered batch of `window_size`-sided tiles.
///
/// The scan is row-major: row origins `0, shift, 2*shift, …` while
/// `origin + window_size` still fits, and for each row origin the same
/// rule over column origins. The element type and value range of the
/// input are preserved; no normalization happens here.
///
/// `skip` consumes that many leading scan positions without emitting a
/// tile, which lets a partially consumed scan resume without rebuilding
/// prior tiles. A `max_count` of zero means unlimited; otherwise the
/// scan stops entirely once that many tiles have been emitted.
pub fn split_image<A: Clone>(
    image: ArrayView3<'_, A>,
    shift: usize,
    window_size: usize,
    max_count: usize,
    skip: usize,
) -> Result<Array4<A>> {
    let (rows, cols, channels) = image.dim();
    if rows != cols {
        return Err(Error::shape(format!(
            "input image must be square, got {rows}x{cols}"
        )));
    }
    if channels != CHANNELS {
        return Err(Error::shape(format!(
            "input image must have {CHANNELS} channels, got {channels}"
        )));
    }
    if window_size > rows {
        return Err(Error::shape(format!(
            "window size {window_size} exceeds image size {rows}"
        )));
    }
    if shift == 0 {
        return Err(Error::shape("shift must be positive"));
    }

    let mut flat: Vec<A> = Vec::new();
    let mut emitted = 0usize;
    let mut skip = skip;

    let mut x = 0usize;
    'scan: while x + window_size <= rows {
        let mut y = 0usize;
        while y + window_size <= cols {
            if skip > 0 {
                skip -= 1;
            } else {
                let part = image.slice(s![x..x + window_size, y..y + window_size, ..]);
                flat.extend(part.iter().cloned());
                emitted += 1;
                if max_count > 0 && emitted >= max_count {
                    break 'scan;
                }
            }
            y += shift;
        }
        x += shift;
    }

    Array4::from_shape_vec((emitted, window_size, window_size, CHANNELS), flat)
        .map_err(|e| Error::shape(format!("tile batch assembly failed: {e}")))
}

/// Tiles produced per axis by a scan over a square image.
pub fn axis_steps(image_size: usize, window_size: usize, shift_size: usize) -> usize {
    if shift_size == 0 || window_size == 0 || window_size > image_size {
        return 0;
    }
    (image_size - window_size) / shift_size + 1
}

/// Number of tiles a full scan will produce, without materializing them.
///
/// Agrees exactly with `split_image(image, shift, window, 0, 0).len()`
/// for any square image of the given size; reconstruction validates
/// predicted batch lengths against this.
pub fn tile_count(image_size: usize, window_size: usize, shift_size: usize) -> usize {
    let steps = axis_steps(image_size, window_size, shift_size);
    steps * steps
}

/// Exact-tiling precondition for the on-disk export path.
///
/// In-memory extraction stays lenient; exporting tiles to files
/// additionally requires the window to divide both dimensions so that
/// no pixel is silently dropped.
pub fn validate_exact_tiling(rows: usize, cols: usize, window_size: usize) -> Result<()> {
    if window_size == 0 || rows % window_size != 0 || cols % window_size != 0 {
        return Err(Error::shape(format!(
            "{rows}x{cols} image cannot be tiled exactly with window {window_size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ByteImage;

    /// Image whose pixel at (r, c) encodes its own coordinates.
    fn coordinate_image(size: usize) -> ByteImage {
        let mut image = ByteImage::zeros((size, size, CHANNELS));
        for r in 0..size {
            for c in 0..size {
                image[[r, c, 0]] = (r % 256) as u8;
                image[[r, c, 1]] = (c % 256) as u8;
                image[[r, c, 2]] = ((r + c) % 256) as u8;
            }
        }
        image
    }

    #[test]
    fn full_tiling_yields_grid_count() {
        let image = coordinate_image(64);
        let tiles = split_image(image.view(), 16, 16, 0, 0).unwrap();
        assert_eq!(tiles.dim(), (16, 16, 16, 3));
        assert_eq!(tile_count(64, 16, 16), 64 * 64 / (16 * 16));
    }

    #[test]
    fn tiles_come_out_in_raster_order() {
        let image = coordinate_image(8);
        let tiles = split_image(image.view(), 4, 4, 0, 0).unwrap();
        assert_eq!(tiles.dim().0, 4);

        // Tile 1 is the second column position of the first row band.
        assert_eq!(tiles[[1, 0, 0, 0]], 0); // row origin 0
        assert_eq!(tiles[[1, 0, 0, 1]], 4); // col origin 4
        // Tile 2 wraps to the second row band.
        assert_eq!(tiles[[2, 0, 0, 0]], 4);
        assert_eq!(tiles[[2, 0, 0, 1]], 0);
    }

    #[test]
    fn rejects_non_square_image() {
        let image = ByteImage::zeros((4, 8, 3));
        let err = split_image(image.view(), 2, 2, 0, 0).unwrap_err();
        assert!(err.to_string().contains("square"));
    }

    #[test]
    fn rejects_wrong_channel_count() {
        let image = ndarray::Array3::<u8>::zeros((4, 4, 4));
        let err = split_image(image.view(), 2, 2, 0, 0).unwrap_err();
        assert!(err.to_string().contains("channels"));
    }

    #[test]
    fn rejects_window_larger_than_image() {
        let image = ByteImage::zeros((4, 4, 3));
        let err = split_image(image.view(), 2, 8, 0, 0).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn trailing_strip_is_ignored_not_an_error() {
        // A 33-pixel image with a 32-pixel window: one tile, no error.
        let image = coordinate_image(33);
        let tiles = split_image(image.view(), 32, 32, 0, 0).unwrap();
        assert_eq!(tiles.dim().0, 1);
        assert_eq!(tile_count(33, 32, 32), 1);
    }

    #[test]
    fn exact_tiling_validation_rejects_indivisible_sizes() {
        // The strict export contract fails where the lenient scan does not.
        assert!(validate_exact_tiling(33, 33, 32).is_err());
        assert!(validate_exact_tiling(64, 64, 16).is_ok());
        assert!(validate_exact_tiling(64, 48, 32).is_err());
    }

    #[test]
    fn max_count_truncates_the_scan() {
        let image = coordinate_image(64);
        let full = split_image(image.view(), 16, 16, 0, 0).unwrap();
        let truncated = split_image(image.view(), 16, 16, 3, 0).unwrap();

        assert_eq!(full.dim().0, 16);
        assert_eq!(truncated.dim().0, 3);
        for i in 0..3 {
            assert_eq!(
                truncated.index_axis(ndarray::Axis(0), i),
                full.index_axis(ndarray::Axis(0), i),
                "truncated tile {i} must match the full scan"
            );
        }
    }

    #[test]
    fn skip_drops_leading_positions() {
        let image = coordinate_image(64);
        let full = split_image(image.view(), 16, 16, 0, 0).unwrap();
        let skipped = split_image(image.view(), 16, 16, 0, 2).unwrap();

        assert_eq!(skipped.dim().0, 14);
        for i in 0..14 {
            assert_eq!(
                skipped.index_axis(ndarray::Axis(0), i),
                full.index_axis(ndarray::Axis(0), i + 2),
                "skipped scan must resume at position {}",
                i + 2
            );
        }
    }

    #[test]
    fn skip_and_max_count_compose() {
        let image = coordinate_image(64);
        let full = split_image(image.view(), 16, 16, 0, 0).unwrap();
        let windowed = split_image(image.view(), 16, 16, 2, 5).unwrap();

        assert_eq!(windowed.dim().0, 2);
        assert_eq!(
            windowed.index_axis(ndarray::Axis(0), 0),
            full.index_axis(ndarray::Axis(0), 5)
        );
        assert_eq!(
            windowed.index_axis(ndarray::Axis(0), 1),
            full.index_axis(ndarray::Axis(0), 6)
        );
    }

    #[test]
    fn oracle_agrees_with_extraction_under_overlap() {
        for (size, window, shift) in [
            (16usize, 8usize, 2usize),
            (16, 8, 8),
            (32, 32, 32),
            (33, 32, 32),
            (64, 16, 4),
            (10, 3, 2),
        ] {
            let image = coordinate_image(size);
            let tiles = split_image(image.view(), shift, window, 0, 0).unwrap();
            assert_eq!(
                tiles.dim().0,
                tile_count(size, window, shift),
                "oracle mismatch for size={size} window={window} shift={shift}"
            );
        }
    }

    #[test]
    fn extraction_preserves_input_values() {
        let image = coordinate_image(16);
        let tiles = split_image(image.view(), 4, 8, 0, 0).unwrap();

        // Tile at row origin 4, col origin 8 (second band, third column).
        let steps = axis_steps(16, 8, 4);
        let tile = tiles.index_axis(ndarray::Axis(0), steps + 2);
        assert_eq!(tile[[0, 0, 0]], 4);
        assert_eq!(tile[[0, 0, 1]], 8);
        assert_eq!(tile[[3, 1, 2]], (4 + 3 + 8 + 1) as u8);
    }
}
