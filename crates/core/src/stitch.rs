//! Reassembly of predicted tiles into full images.
//!
//! Two reconstruction passes exist, chosen by whether the shift equals
//! the window size. Full tiling places a disjoint grid; windowed
//! stitching overwrites overlapping footprints in scan order. Both rely
//! on tiles being replayed in the exact raster order the extractor
//! emitted them.

use ndarray::{s, Array4, ArrayView3, ArrayView4, Axis};
use tracing::debug;

use crate::error::{Error, Result};
use crate::predictor::Predictor;
use crate::tiling::axis_steps;
use crate::types::{ByteImage, UnitImage, CHANNELS};

/// Write one tile's full footprint into the output at the given origin.
///
/// This is the whole overlap-resolution policy: a commit overwrites
/// every pixel under the tile, so when callers commit tiles in
/// increasing raster order, the survivor at any overlapped pixel is the
/// tile with the numerically greatest origin that covers it (last
/// writer wins along each axis). Reordering commits changes the output
/// without any error being raised, which is why the ordering contract
/// lives here and in the callers' loops and nowhere else.
pub fn commit_tile(output: &mut UnitImage, tile: ArrayView3<'_, f32>, row0: usize, col0: usize) {
    let (tile_rows, tile_cols, _) = tile.dim();
    output
        .slice_mut(s![row0..row0 + tile_rows, col0..col0 + tile_cols, ..])
        .assign(&tile);
}

fn validate_tile_dims(tiles: &ArrayView4<'_, f32>, window_size: usize) -> Result<()> {
    let (_, tile_rows, tile_cols, tile_channels) = tiles.dim();
    if tile_rows != window_size || tile_cols != window_size || tile_channels != CHANNELS {
        return Err(Error::shape(format!(
            "tiles are {tile_rows}x{tile_cols}x{tile_channels}, expected {window_size}x{window_size}x{CHANNELS}"
        )));
    }
    Ok(())
}

/// Reassemble a non-overlapping grid of predicted tiles (shift equal to
/// the window size) into one unit-range image.
///
/// The batch must hold `steps²` tiles in raster order; the tile for
/// grid cell `(x, y)` sits at flat index `x * steps + y`. When the
/// window does not divide the image size, the trailing strip outside
/// the grid stays at its zero initialization — a documented boundary
/// gap, not an error. Byte-range conversion is the caller's
/// output-formatting step.
pub fn rebuild_full(
    tiles: ArrayView4<'_, f32>,
    image_size: usize,
    window_size: usize,
) -> Result<UnitImage> {
    let steps = axis_steps(image_size, window_size, window_size);
    let expected = steps * steps;
    if tiles.dim().0 != expected {
        return Err(Error::shape(format!(
            "full rebuild of size {image_size} with window {window_size} needs {expected} tiles, got {}",
            tiles.dim().0
        )));
    }
    validate_tile_dims(&tiles, window_size)?;

    let mut output = UnitImage::zeros((image_size, image_size, CHANNELS));
    for x in 0..steps {
        for y in 0..steps {
            let tile = tiles.index_axis(Axis(0), x * steps + y);
            commit_tile(&mut output, tile, x * window_size, y * window_size);
        }
    }
    Ok(output)
}

/// Extract, predict, and stitch a windowed scan (shift smaller than the
/// window size) one row band at a time.
///
/// Processing a band means building its batch of unit-range tiles from
/// the original byte-range image, invoking the predictor once for the
/// whole band, and committing each predicted tile's entire footprint in
/// increasing column order. Bands run in increasing row-origin order;
/// that ordering is load-bearing, since later bands must overwrite the
/// trailing rows of earlier ones (see [`commit_tile`]). Pixels beyond
/// the last tile's coverage remain zero.
///
/// A failed band propagates its error and the in-progress buffer is
/// dropped; no partially stitched image is ever returned.
pub fn rebuild_windowed(
    image: &ByteImage,
    predictor: &mut dyn Predictor,
    shift: usize,
    window_size: usize,
) -> Result<UnitImage> {
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
    if shift == 0 || shift > window_size {
        return Err(Error::shape(format!(
            "shift {shift} must be in 1..={window_size}"
        )));
    }

    let steps = axis_steps(rows, window_size, shift);
    let mut output = UnitImage::zeros((rows, cols, CHANNELS));

    for band in 0..steps {
        let row0 = band * shift;

        let mut flat = Vec::with_capacity(steps * window_size * window_size * CHANNELS);
        for col in 0..steps {
            let col0 = col * shift;
            let tile = image.slice(s![row0..row0 + window_size, col0..col0 + window_size, ..]);
            flat.extend(tile.iter().map(|&v| f32::from(v) / 255.0));
        }
        let batch =
            Array4::from_shape_vec((steps, window_size, window_size, CHANNELS), flat)
                .map_err(|e| Error::shape(format!("band batch assembly failed: {e}")))?;

        let predicted = predictor.predict(batch.view())?;
        if predicted.dim().0 != steps {
            return Err(Error::Predictor {
                expected: steps,
                actual: predicted.dim().0,
            });
        }
        validate_tile_dims(&predicted.view(), window_size)?;

        for col in 0..steps {
            commit_tile(&mut output, predicted.index_axis(Axis(0), col), row0, col * shift);
        }
        debug!(band, row0, tiles = steps, "stitched row band");
    }

    Ok(output)
}
