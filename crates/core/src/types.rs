//! Shared image and tile-batch representations.
//!
//! Two pixel encodings coexist across the pipeline: *byte range*
//! (`u8`, 0–255, the on-disk form) and *unit range* (`f32`, [0, 1], the
//! model input/output form). Conversion is exact and reversible up to
//! rounding. Channel order is RGB everywhere inside the engine; see the
//! codec module for the boundary rule.

use ndarray::{Array3, Array4, ArrayView3};

/// Fixed channel count for every image the engine touches.
pub const CHANNELS: usize = 3;

/// Byte-range image: `(rows, cols, 3)`, RGB, 0–255.
pub type ByteImage = Array3<u8>;

/// Unit-range image: `(rows, cols, 3)`, RGB, values in [0, 1].
pub type UnitImage = Array3<f32>;

/// Batch of square tiles indexed `[tile, row, col, channel]`, in the
/// emission order of the scan that produced them.
pub type TileBatch = Array4<f32>;

/// Convert a byte-range image to unit range (`v / 255`).
pub fn byte_to_unit(image: ArrayView3<'_, u8>) -> UnitImage {
    image.mapv(|v| f32::from(v) / 255.0)
}

/// Convert a unit-range image to byte range (`round(v * 255)`, clamped).
pub fn unit_to_byte(image: ArrayView3<'_, f32>) -> ByteImage {
    image.mapv(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_unit_round_trip_is_exact_for_all_values() {
        let mut data = Vec::with_capacity(256 * 3);
        for v in 0..=255u8 {
            data.extend_from_slice(&[v, v, v]);
        }
        let image = ByteImage::from_shape_vec((16, 16, 3), data).unwrap();

        let restored = unit_to_byte(byte_to_unit(image.view()).view());
        assert_eq!(restored, image);
    }

    #[test]
    fn unit_to_byte_clamps_out_of_range_values() {
        let mut image = UnitImage::zeros((1, 1, 3));
        image[[0, 0, 0]] = -0.5;
        image[[0, 0, 1]] = 1.5;
        image[[0, 0, 2]] = 0.5;

        let bytes = unit_to_byte(image.view());
        assert_eq!(bytes[[0, 0, 0]], 0);
        assert_eq!(bytes[[0, 0, 1]], 255);
        assert_eq!(bytes[[0, 0, 2]], 128); // 0.5 * 255 = 127.5 → 128
    }

    #[test]
    fn byte_to_unit_stays_in_unit_interval() {
        let image = ByteImage::from_elem((2, 2, 3), 255);
        let unit = byte_to_unit(image.view());
        assert!(unit.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!((unit[[0, 0, 0]] - 1.0).abs() < f32::EPSILON);
    }
}
