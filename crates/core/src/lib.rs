//! Core crate for the normatile tiling / stitching engine.

pub mod codec;
pub mod config;
pub mod dataset;
pub mod downscale;
pub mod error;
pub mod logging;
pub mod onnx;
pub mod pipeline;
pub mod predictor;
pub mod stitch;
pub mod tiling;
pub mod types;

pub use error::{Error, Result};
