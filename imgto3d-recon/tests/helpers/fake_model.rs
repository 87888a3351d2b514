//! Deterministic depth models
//!
//! No inference runtime is involved: each fake emits a fixed raster shape at
//! the declared input resolution.

use imgto3d_recon::depth::{DepthModel, InferenceError, InputTensor, ModelLoader, OutputTensor};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What the fake model returns
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FakeOutput {
    /// Left-to-right ramp (far on the left, near on the right)
    Ramp,
    /// Every value equal (degenerate output)
    Flat(f32),
    /// Forward pass fails
    Fail,
}

pub struct FakeDepthModel {
    output: FakeOutput,
    shape: Vec<i64>,
}

impl DepthModel for FakeDepthModel {
    fn input_name(&self) -> &str {
        "pixel_values"
    }

    fn output_name(&self) -> &str {
        "predicted_depth"
    }

    fn input_shape(&self) -> &[i64] {
        &self.shape
    }

    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, InferenceError> {
        let (h, w) = (input.height(), input.width());
        let data = match self.output {
            FakeOutput::Ramp => (0..h * w).map(|i| (i % w) as f32 * 10.0).collect(),
            FakeOutput::Flat(v) => vec![v; h * w],
            FakeOutput::Fail => return Err(InferenceError::Run("fake failure".to_string())),
        };
        Ok(OutputTensor {
            shape: vec![1, h, w],
            data,
        })
    }
}

/// Loader producing [`FakeDepthModel`]s; counts loads
pub struct FakeModelLoader {
    output: FakeOutput,
    shape: Vec<i64>,
    fail_load: bool,
    loads: AtomicUsize,
}

impl FakeModelLoader {
    pub fn new(output: FakeOutput) -> Self {
        Self {
            output,
            shape: vec![1, 3, 16, 16],
            fail_load: false,
            loads: AtomicUsize::new(0),
        }
    }

    /// Loader that rejects every model file
    pub fn invalid() -> Self {
        Self {
            fail_load: true,
            ..Self::new(FakeOutput::Ramp)
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for FakeModelLoader {
    fn load(&self, _path: &Path) -> Result<Box<dyn DepthModel>, InferenceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(InferenceError::Load("not a model".to_string()));
        }
        Ok(Box::new(FakeDepthModel {
            output: self.output,
            shape: self.shape.clone(),
        }))
    }
}

/// Write a placeholder model file and return its path
pub fn write_model_file(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"fake weights").unwrap();
    path
}
