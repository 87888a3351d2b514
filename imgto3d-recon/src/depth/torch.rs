//! TorchScript depth models (libtorch via `tch`)
//!
//! TorchScript modules do not expose their input shape, so the model reports
//! a dynamic `[1, 3, -1, -1]` input and the engine falls back to its default size.

use super::model::{DepthModel, InferenceError, InputTensor, ModelLoader, OutputTensor};
use std::path::Path;
use tch::{Device, Kind, Tensor};
use tracing::info;

const DYNAMIC_INPUT_SHAPE: [i64; 4] = [1, 3, -1, -1];

/// Loads `.pt` TorchScript files onto the best available device
pub struct TorchModelLoader {
    device: Device,
}

impl TorchModelLoader {
    /// CUDA when available, CPU otherwise
    pub fn new() -> Self {
        Self::with_device(Device::cuda_if_available())
    }

    pub fn with_device(device: Device) -> Self {
        Self { device }
    }
}

impl Default for TorchModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelLoader for TorchModelLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn DepthModel>, InferenceError> {
        let module = tch::CModule::load_on_device(path, self.device)
            .map_err(|e| InferenceError::Load(e.to_string()))?;
        info!(device = ?self.device, "TorchScript module loaded");
        Ok(Box::new(TorchDepthModel {
            module,
            device: self.device,
        }))
    }
}

/// One TorchScript module
pub struct TorchDepthModel {
    module: tch::CModule,
    device: Device,
}

impl DepthModel for TorchDepthModel {
    fn input_name(&self) -> &str {
        "input"
    }

    fn output_name(&self) -> &str {
        "output"
    }

    fn input_shape(&self) -> &[i64] {
        &DYNAMIC_INPUT_SHAPE
    }

    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, InferenceError> {
        let dims: Vec<i64> = input.shape.iter().map(|&d| d as i64).collect();
        let tensor = Tensor::from_slice(&input.data)
            .view(dims.as_slice())
            .to_device(self.device);

        let output = tch::no_grad(|| self.module.forward_ts(&[tensor]))
            .map_err(|e| InferenceError::Run(e.to_string()))?
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .contiguous();

        let shape: Vec<usize> = output.size().iter().map(|&d| d.max(0) as usize).collect();
        let data = Vec::<f32>::try_from(output.flatten(0, -1))
            .map_err(|e| InferenceError::Run(e.to_string()))?;

        Ok(OutputTensor { shape, data })
    }
}
