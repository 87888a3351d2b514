//! ONNX depth models (ONNX Runtime via `ort`)
//!
//! Tensor names and the declared input shape are read from the session, so
//! fixed-resolution exports (e.g. DPT at 384x384) are fed at their own size
//! and dynamic axes fall back to the engine default.

use super::model::{DepthModel, InferenceError, InputTensor, ModelLoader, OutputTensor};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use std::path::Path;
use tracing::info;

/// Loads `.onnx` files into single-threaded CPU sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxModelLoader;

impl OnnxModelLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn DepthModel>, InferenceError> {
        let load_err = |e: ort::Error| InferenceError::Load(e.to_string());
        let session = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .map_err(load_err)?
            .with_intra_threads(1)
            .map_err(load_err)?
            .commit_from_file(path)
            .map_err(load_err)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| InferenceError::Load("model has no inputs".to_string()))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| InferenceError::Load("model has no outputs".to_string()))?;

        let input_shape = match &input.input_type {
            ValueType::Tensor { dimensions, .. } => dimensions.clone(),
            other => {
                return Err(InferenceError::Load(format!(
                    "input {} is not a tensor: {:?}",
                    input.name, other
                )))
            }
        };
        let input_name = input.name.clone();
        let output_name = output.name.clone();
        info!(
            input = %input_name,
            output = %output_name,
            shape = ?input_shape,
            "ONNX session created"
        );

        Ok(Box::new(OnnxDepthModel {
            session,
            input_name,
            output_name,
            input_shape,
        }))
    }
}

/// One ONNX Runtime session
pub struct OnnxDepthModel {
    session: Session,
    input_name: String,
    output_name: String,
    input_shape: Vec<i64>,
}

impl DepthModel for OnnxDepthModel {
    fn input_name(&self) -> &str {
        &self.input_name
    }

    fn output_name(&self) -> &str {
        &self.output_name
    }

    fn input_shape(&self) -> &[i64] {
        &self.input_shape
    }

    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, InferenceError> {
        let run_err = |e: ort::Error| InferenceError::Run(e.to_string());
        let dims: Vec<i64> = input.shape.iter().map(|&d| d as i64).collect();
        let tensor = Tensor::from_array((dims, input.data.clone())).map_err(run_err)?;

        let inputs = ort::inputs![self.input_name.as_str() => tensor].map_err(run_err)?;
        let outputs = self.session.run(inputs).map_err(run_err)?;
        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_raw_tensor::<f32>()
            .map_err(run_err)?;

        Ok(OutputTensor {
            shape: shape.iter().map(|&d| d.max(0) as usize).collect(),
            data: data.to_vec(),
        })
    }
}
