//! Downscale guard applied before tiling.
//!
//! Oversized inputs are reduced by exact power-of-two halvings rather
//! than a single resize to an arbitrary target, so that a paired
//! RGB/normal image receiving the same treatment stays aligned to the
//! same pixel grid.

use tracing::debug;

use crate::types::{ByteImage, CHANNELS};

/// Default ceiling on the row count of an image entering the extractor.
pub const DEFAULT_MAX_DIMENSION: usize = 1024;

/// Halve both dimensions with a 2x2 box average.
///
/// An odd trailing row or column has no complete 2x2 block and is
/// dropped by the floor division.
fn halve(image: &ByteImage) -> ByteImage {
    let (rows, cols, _) = image.dim();
    let (out_rows, out_cols) = (rows / 2, cols / 2);

    let mut out = ByteImage::zeros((out_rows, out_cols, CHANNELS));
    for r in 0..out_rows {
        for c in 0..out_cols {
            for ch in 0..CHANNELS {
                let sum = u16::from(image[[2 * r, 2 * c, ch]])
                    + u16::from(image[[2 * r, 2 * c + 1, ch]])
                    + u16::from(image[[2 * r + 1, 2 * c, ch]])
                    + u16::from(image[[2 * r + 1, 2 * c + 1, ch]]);
                out[[r, c, ch]] = ((sum + 2) / 4) as u8;
            }
        }
    }
    out
}

/// Repeatedly halve the image until its row count fits within
/// `max_dimension`. Guarantees `rows <= max_dimension` on return, which
/// bounds tile counts and peak memory for everything downstream.
pub fn shrink_to_fit(mut image: ByteImage, max_dimension: usize) -> ByteImage {
    while image.dim().0 > max_dimension {
        image = halve(&image);
        debug!(
            rows = image.dim().0,
            cols = image.dim().1,
            "halved oversized image"
        );
    }
    image
}

/// Apply the identical sequence of halvings to a paired RGB/normal
/// image so both stay pixel-aligned. The pass count is driven by the
/// first image; pairs are expected to share dimensions.
pub fn shrink_pair_to_fit(
    mut rgb: ByteImage,
    mut normal: ByteImage,
    max_dimension: usize,
) -> (ByteImage, ByteImage) {
    while rgb.dim().0 > max_dimension {
        rgb = halve(&rgb);
        normal = halve(&normal);
        debug!(
            rows = rgb.dim().0,
            cols = rgb.dim().1,
            "halved oversized image pair"
        );
    }
    (rgb, normal)
}
