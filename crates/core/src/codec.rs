//! Image decode/encode boundary.
//!
//! The engine's internal channel convention is RGB, pinned. The `image`
//! crate already yields RGB byte triples, so no channel swap happens
//! here; any future codec that speaks BGR must convert inside this
//! module and nowhere else. 8-bit-per-channel data round-trips
//! losslessly through PNG.

use std::path::Path;

use image::RgbImage;
use ndarray::Array3;

use crate::error::{Error, Result};
use crate::types::{ByteImage, CHANNELS};

/// Decode an image file into a byte-range RGB array.
pub fn decode(path: &Path) -> Result<ByteImage> {
    let img = image::open(path).map_err(|source| Error::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    Array3::from_shape_vec((height as usize, width as usize, CHANNELS), rgb.into_raw()).map_err(
        |e| {
            Error::shape(format!(
                "decoded buffer shape mismatch for {}: {e}",
                path.display()
            ))
        },
    )
}

/// Encode a byte-range RGB array to the given path; format follows the
/// file extension.
pub fn encode(path: &Path, image: &ByteImage) -> Result<()> {
    let (rows, cols, channels) = image.dim();
    if channels != CHANNELS {
        return Err(Error::shape(format!(
            "cannot encode image with {channels} channels"
        )));
    }

    // Logical (row-major) iteration order matches the interleaved RGB
    // buffer layout regardless of the array's memory layout.
    let data: Vec<u8> = image.iter().copied().collect();
    let buffer = RgbImage::from_raw(cols as u32, rows as u32, data).ok_or_else(|| {
        Error::shape(format!("pixel buffer does not match {rows}x{cols} image"))
    })?;

    buffer.save(path).map_err(|source| Error::ImageEncode {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn png_round_trip_is_lossless() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("tile.png");

        let mut image = ByteImage::zeros((9, 9, 3));
        for r in 0..9 {
            for c in 0..9 {
                image[[r, c, 0]] = (r * 20) as u8;
                image[[r, c, 1]] = (c * 20) as u8;
                image[[r, c, 2]] = (r * c) as u8;
            }
        }

        encode(&path, &image).expect("encode");
        let decoded = decode(&path).expect("decode");
        assert_eq!(decoded, image);
    }

    #[test]
    fn decode_missing_file_is_a_decode_error() {
        let dir = tempdir().expect("tempdir");
        let err = decode(&dir.path().join("missing.png")).unwrap_err();
        assert!(matches!(err, Error::ImageDecode { .. }));
        assert!(err.to_string().contains("missing.png"));
    }

    #[test]
    fn encode_rejects_wrong_channel_count() {
        let dir = tempdir().expect("tempdir");
        let image = Array3::<u8>::zeros((4, 4, 1));
        let err = encode(&dir.path().join("bad.png"), &image).unwrap_err();
        assert!(matches!(err, Error::Shape { .. }));
    }

    #[test]
    fn encode_preserves_non_square_dimensions() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("wide.png");

        let image = ByteImage::from_elem((3, 7, 3), 99);
        encode(&path, &image).expect("encode");
        let decoded = decode(&path).expect("decode");
        assert_eq!(decoded.dim(), (3, 7, 3));
    }
}
