//! ONNX-backed predictor via `ort::Session`.
//!
//! Supports both FP32 and FP16 normal-generator models; the input dtype
//! is detected from the session and batches are converted with the
//! `half` helpers when needed. Tile batches stay in NHWC layout, the
//! shape the generator was trained with.

use std::path::Path;

use half::f16;
use half::slice::HalfFloatSliceExt;
use ndarray::{Array4, ArrayD, ArrayView4, IxDyn};
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::predictor::Predictor;

/// Inference backend selection. Default is `Cpu`; `Cuda` registers the
/// CUDA EP and lets ORT fall back to CPU when it is unavailable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InferenceBackend {
    #[default]
    Cpu,
    Cuda,
}

impl InferenceBackend {
    /// Parse from string (case-insensitive). Returns `Cpu` for unknown values.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "cuda" | "gpu" => Self::Cuda,
            _ => Self::Cpu,
        }
    }
}

impl std::fmt::Display for InferenceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
        }
    }
}

pub struct OnnxPredictor {
    session: Session,
    input_name: String,
    output_name: String,
    is_fp16_model: bool,
}

impl std::fmt::Debug for OnnxPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxPredictor")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("is_fp16_model", &self.is_fp16_model)
            .finish_non_exhaustive()
    }
}

impl OnnxPredictor {
    /// Build a session for the model at `model_path` and detect its IO.
    pub fn load(model_path: &Path, backend: InferenceBackend) -> Result<Self> {
        let model_load = |source| Error::ModelLoad {
            path: model_path.to_path_buf(),
            source,
        };

        let builder = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .map_err(model_load)?;

        let session = match backend {
            InferenceBackend::Cuda => {
                let cuda = CUDAExecutionProvider::default();
                if !cuda.is_available().unwrap_or(false) {
                    warn!("CUDA EP is not available — inference will fall back to CPU");
                }
                builder
                    .with_execution_providers([CUDAExecutionProvider::default().build()])
                    .and_then(|b| b.commit_from_file(model_path))
                    .map_err(model_load)?
            }
            InferenceBackend::Cpu => {
                debug!(backend = "cpu", "Building session without extra EPs");
                builder.commit_from_file(model_path).map_err(model_load)?
            }
        };

        let input_name = session.inputs()[0].name().to_string();
        let output_name = session.outputs()[0].name().to_string();
        let is_fp16_model = match session.inputs()[0].dtype() {
            ort::value::ValueType::Tensor { ty, .. } => {
                *ty == ort::tensor::TensorElementType::Float16
            }
            _ => false,
        };

        debug!(%input_name, %output_name, is_fp16_model, "Detected model IO");

        Ok(Self {
            session,
            input_name,
            output_name,
            is_fp16_model,
        })
    }
}

fn run_f32_inference(
    session: &mut Session,
    batch: ArrayView4<'_, f32>,
    input_name: &str,
    output_name: &str,
) -> Result<ArrayD<f32>> {
    let input_tensor = Tensor::from_array(batch.to_owned())?;
    let outputs = session.run(ort::inputs![input_name => &input_tensor])?;
    let output_view = outputs[output_name].try_extract_array::<f32>()?;
    Ok(output_view.to_owned())
}

fn run_f16_inference(
    session: &mut Session,
    batch: ArrayView4<'_, f32>,
    input_name: &str,
    output_name: &str,
) -> Result<ArrayD<f32>> {
    let owned = batch.to_owned();
    let f32_slice = owned
        .as_slice()
        .expect("freshly owned batch must be contiguous for SIMD f16 conversion");
    let mut fp16_data = vec![f16::ZERO; f32_slice.len()];
    fp16_data.convert_from_f32_slice(f32_slice);

    let shape: Vec<usize> = batch.shape().to_vec();
    let fp16_array = ArrayD::from_shape_vec(IxDyn(&shape), fp16_data)
        .map_err(|e| Error::shape(format!("fp16 batch assembly failed: {e}")))?;
    let input_tensor = Tensor::from_array(fp16_array)?;
    let outputs = session.run(ort::inputs![input_name => &input_tensor])?;
    let output_view = outputs[output_name].try_extract_array::<f16>()?;

    let fp16_owned;
    let fp16_slice = if let Some(s) = output_view.as_slice() {
        s
    } else {
        fp16_owned = output_view.as_standard_layout().into_owned();
        fp16_owned.as_slice().unwrap()
    };
    let mut f32_data = vec![0.0f32; fp16_slice.len()];
    fp16_slice.convert_to_f32_slice(&mut f32_data);

    ArrayD::from_shape_vec(output_view.shape().to_vec(), f32_data)
        .map_err(|e| Error::shape(format!("fp16 output assembly failed: {e}")))
}

impl Predictor for OnnxPredictor {
    fn predict(&mut self, batch: ArrayView4<'_, f32>) -> Result<Array4<f32>> {
        let in_dim = batch.dim();
        let input_name = self.input_name.clone();
        let output_name = self.output_name.clone();

        let output = if self.is_fp16_model {
            run_f16_inference(&mut self.session, batch, &input_name, &output_name)?
        } else {
            run_f32_inference(&mut self.session, batch, &input_name, &output_name)?
        };

        let output = output
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| Error::shape(format!("model output is not a 4-D tile batch: {e}")))?;
        if output.dim() != in_dim {
            return Err(Error::shape(format!(
                "model output shape {:?} does not match input {:?}",
                output.dim(),
                in_dim
            )));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_from_str_lossy() {
        assert_eq!(InferenceBackend::from_str_lossy("cpu"), InferenceBackend::Cpu);
        assert_eq!(InferenceBackend::from_str_lossy("cuda"), InferenceBackend::Cuda);
        assert_eq!(InferenceBackend::from_str_lossy("CUDA"), InferenceBackend::Cuda);
        assert_eq!(InferenceBackend::from_str_lossy("gpu"), InferenceBackend::Cuda);
        assert_eq!(InferenceBackend::from_str_lossy("unknown"), InferenceBackend::Cpu);
        assert_eq!(InferenceBackend::from_str_lossy(""), InferenceBackend::Cpu);
    }

    #[test]
    fn backend_display() {
        assert_eq!(InferenceBackend::Cpu.to_string(), "cpu");
        assert_eq!(InferenceBackend::Cuda.to_string(), "cuda");
    }

    #[test]
    fn load_missing_model_is_a_model_load_error() {
        let err = OnnxPredictor::load(
            Path::new("/nonexistent/normal_generator.onnx"),
            InferenceBackend::Cpu,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
    }

    /// Requires a real model file. Run: `cargo test -p normatile-core -- --ignored`
    #[test]
    #[ignore]
    fn full_inference_small_batch() {
        let mut predictor = OnnxPredictor::load(
            Path::new("models/normal_generator.onnx"),
            InferenceBackend::Cpu,
        )
        .expect("model should load");

        let batch = Array4::<f32>::from_elem((2, 32, 32, 3), 0.5);
        let out = predictor.predict(batch.view()).expect("inference should succeed");
        assert_eq!(out.dim(), (2, 32, 32, 3));
        assert!(out.iter().all(|v| v.is_finite()));
    }
}
