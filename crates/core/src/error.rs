//! Error taxonomy for the tiling / stitching engine.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the normatile library.
#[derive(Error, Debug)]
pub enum Error {
    /// Geometric contract violation: non-square input, wrong channel
    /// count, window larger than the image, inexact tiling on export, or
    /// a tile batch whose length disagrees with the count oracle.
    /// Always fatal to the current image's pipeline.
    #[error("shape error: {reason}")]
    Shape { reason: String },

    /// The predictor returned a batch of a different length than it was
    /// given. Propagated, never retried.
    #[error("predictor returned {actual} tiles, expected {expected}")]
    Predictor { expected: usize, actual: usize },

    /// Failed to decode an image file.
    #[error("failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to encode an image file.
    #[error("failed to encode image {path}: {source}")]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to load an ONNX model.
    #[error("failed to load ONNX model {path}: {source}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },

    /// Model inference failed.
    #[error("model inference failed: {source}")]
    Inference {
        #[from]
        source: ort::Error,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Filesystem failure at a known path. Aborts only the current
    /// image in multi-image loops.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        Self::Shape {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for normatile operations.
pub type Result<T> = std::result::Result<T, Error>;
