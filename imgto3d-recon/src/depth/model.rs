//! Inference seam between the depth engine and a concrete runtime
//!
//! The engine owns preprocessing and postprocessing; a [`DepthModel`] only
//! maps one NCHW float tensor to one float tensor whose last two dimensions
//! are the depth raster.

use std::path::Path;
use thiserror::Error;

/// Inference runtime errors
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Runtime could not parse or instantiate the model file
    #[error("Model load failed: {0}")]
    Load(String),

    /// Forward pass failed
    #[error("Inference failed: {0}")]
    Run(String),

    /// Output tensor has an unusable shape
    #[error("Unexpected tensor shape: {0:?}")]
    Shape(Vec<usize>),
}

/// Dense NCHW input tensor (`[1, 3, H, W]`)
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl InputTensor {
    pub fn width(&self) -> usize {
        self.shape[3]
    }

    pub fn height(&self) -> usize {
        self.shape[2]
    }
}

/// Dense row-major output tensor of any rank
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl OutputTensor {
    /// `(height, width)` from the last two dimensions
    ///
    /// Fails when rank < 2 or the element count does not cover `height * width`.
    pub fn raster_dims(&self) -> Result<(usize, usize), InferenceError> {
        let rank = self.shape.len();
        if rank < 2 {
            return Err(InferenceError::Shape(self.shape.clone()));
        }
        let (h, w) = (self.shape[rank - 2], self.shape[rank - 1]);
        if h == 0 || w == 0 || self.data.len() < h * w {
            return Err(InferenceError::Shape(self.shape.clone()));
        }
        Ok((h, w))
    }
}

/// One loaded depth model
///
/// `run` takes `&mut self` because some runtimes keep per-session scratch state.
pub trait DepthModel: Send {
    /// Name of the single input tensor
    fn input_name(&self) -> &str;

    /// Name of the single output tensor
    fn output_name(&self) -> &str;

    /// Declared input shape; negative entries are dynamic
    fn input_shape(&self) -> &[i64];

    fn run(&mut self, input: &InputTensor) -> Result<OutputTensor, InferenceError>;
}

/// Factory for [`DepthModel`]s
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn DepthModel>, InferenceError>;
}
