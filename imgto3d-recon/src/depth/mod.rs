//! Monocular depth estimation

pub mod depth_map;
pub mod engine;
pub mod model;
#[cfg(feature = "with-ort")]
pub mod onnx;
pub mod registry;
#[cfg(feature = "with-tch")]
pub mod torch;

pub use depth_map::{DepthMap, DepthStats};
pub use engine::{DepthEstimationEngine, ModelFamily};
pub use model::{DepthModel, InferenceError, InputTensor, ModelLoader, OutputTensor};
#[cfg(feature = "with-ort")]
pub use onnx::OnnxModelLoader;
pub use registry::ModelLoaderRegistry;
#[cfg(feature = "with-tch")]
pub use torch::TorchModelLoader;
