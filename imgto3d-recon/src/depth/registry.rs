//! Model runtime selection by file extension

use super::model::{DepthModel, InferenceError, ModelLoader};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Routes each model file to the loader registered for its extension
#[derive(Default, Clone)]
pub struct ModelLoaderRegistry {
    loaders: HashMap<String, Arc<dyn ModelLoader>>,
}

impl ModelLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every runtime compiled into this build
    pub fn with_compiled_runtimes() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "with-ort")]
        {
            registry.register("onnx", Arc::new(super::onnx::OnnxModelLoader::new()));
        }
        #[cfg(feature = "with-tch")]
        {
            let torch: Arc<dyn ModelLoader> = Arc::new(super::torch::TorchModelLoader::new());
            registry.register("pt", torch.clone());
            registry.register("pth", torch);
        }
        registry
    }

    /// Register `loader` for `extension` (case-insensitive, without the dot)
    pub fn register(&mut self, extension: &str, loader: Arc<dyn ModelLoader>) {
        self.loaders
            .insert(extension.trim_start_matches('.').to_lowercase(), loader);
    }

    /// Registered extensions, sorted
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.loaders.keys().cloned().collect();
        exts.sort();
        exts
    }
}

impl ModelLoader for ModelLoaderRegistry {
    fn load(&self, path: &Path) -> Result<Box<dyn DepthModel>, InferenceError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match self.loaders.get(&ext) {
            Some(loader) => loader.load(path),
            None if self.loaders.is_empty() => Err(InferenceError::Load(
                "no inference runtime; rebuild with --features with-ort or with-tch".to_string(),
            )),
            None => Err(InferenceError::Load(format!(
                "no runtime for .{} models (supported: {})",
                ext,
                self.extensions().join(", ")
            ))),
        }
    }
}
