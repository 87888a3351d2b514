//! Monocular depth estimation engine
//!
//! Wraps one loaded [`DepthModel`] and turns a color image into a normalized
//! [`DepthMap`] at the image's own resolution:
//!
//! 1. resize to the model input (Catmull-Rom), scale to [0, 1]
//! 2. per-channel ImageNet mean/std normalization, NCHW layout
//! 3. forward pass
//! 4. min-max normalize the output raster
//! 5. cubic resize back to the source resolution
//!
//! Each job owns its own engine; the engine is never shared across threads.

use super::depth_map::DepthMap;
use super::model::{DepthModel, InferenceError, InputTensor, ModelLoader, OutputTensor};
use image::imageops::{self, FilterType};
use image::RgbImage;
use imgto3d_common::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// ImageNet per-channel mean (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet per-channel standard deviation (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Model architecture guessed from the file name (diagnostics only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Dpt,
    Midas,
    Unknown,
}

impl ModelFamily {
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("dpt") {
            ModelFamily::Dpt
        } else if name.contains("midas") {
            ModelFamily::Midas
        } else {
            ModelFamily::Unknown
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelFamily::Dpt => "DPT",
            ModelFamily::Midas => "MiDaS",
            ModelFamily::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

struct LoadedModel {
    path: PathBuf,
    model: Box<dyn DepthModel>,
    input_width: u32,
    input_height: u32,
    family: ModelFamily,
}

/// Depth estimation engine
pub struct DepthEstimationEngine {
    loader: Arc<dyn ModelLoader>,
    default_input_size: u32,
    loaded: Option<LoadedModel>,
}

impl DepthEstimationEngine {
    /// Create an engine with nothing loaded
    ///
    /// `default_input_size` is used for any input dimension the model declares dynamic.
    pub fn new(loader: Arc<dyn ModelLoader>, default_input_size: u32) -> Self {
        Self {
            loader,
            default_input_size: default_input_size.max(1),
            loaded: None,
        }
    }

    /// Load the model at `path`
    ///
    /// Reloading the path that is already loaded is a no-op. A failed load
    /// leaves the engine with no model.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(Error::ModelMissing(path.to_path_buf()));
        }
        let resolved = path.canonicalize()?;

        if self.model_path() == Some(resolved.as_path()) {
            debug!(model = %resolved.display(), "Model already loaded");
            return Ok(());
        }

        self.loaded = None;
        let model = self
            .loader
            .load(&resolved)
            .map_err(|e| Error::ModelInvalid(format!("{}: {}", resolved.display(), e)))?;

        let (input_width, input_height) = self.resolve_input_size(model.input_shape());
        let family = ModelFamily::from_path(&resolved);

        info!(
            model = %resolved.display(),
            family = %family,
            input = model.input_name(),
            output = model.output_name(),
            "Model loaded ({}x{})",
            input_width,
            input_height
        );

        self.loaded = Some(LoadedModel {
            path: resolved,
            model,
            input_width,
            input_height,
            family,
        });
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.loaded.is_some()
    }

    /// Resolved path of the loaded model
    pub fn model_path(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|m| m.path.as_path())
    }

    /// Model input `(width, height)`
    pub fn input_size(&self) -> Option<(u32, u32)> {
        self.loaded.as_ref().map(|m| (m.input_width, m.input_height))
    }

    pub fn family(&self) -> Option<ModelFamily> {
        self.loaded.as_ref().map(|m| m.family)
    }

    /// Estimate depth for one image
    ///
    /// Returns `None` when no model is loaded, the image is empty, inference
    /// fails, or `cancel` fires before the map is complete. Failures are logged.
    pub fn infer(&mut self, image: &RgbImage, cancel: &CancellationToken) -> Option<DepthMap> {
        let loaded = self.loaded.as_mut()?;
        let (src_w, src_h) = image.dimensions();
        if src_w == 0 || src_h == 0 {
            warn!("Skipping empty image");
            return None;
        }
        if cancel.is_cancelled() {
            return None;
        }

        let input = preprocess(image, loaded.input_width, loaded.input_height);
        if cancel.is_cancelled() {
            return None;
        }

        let output = match loaded.model.run(&input) {
            Ok(output) => output,
            Err(e) => {
                warn!(model = %loaded.path.display(), "Inference failed: {}", e);
                return None;
            }
        };
        if cancel.is_cancelled() {
            return None;
        }

        let depth = match raster_from_output(&output) {
            Ok(depth) => depth,
            Err(e) => {
                warn!("Discarding model output: {}", e);
                return None;
            }
        };
        if cancel.is_cancelled() {
            return None;
        }

        Some(depth.resize_cubic(src_w, src_h))
    }

    fn resolve_input_size(&self, shape: &[i64]) -> (u32, u32) {
        let dim = |i: usize| -> u32 {
            match shape.get(i) {
                Some(&d) if d > 0 => u32::try_from(d).unwrap_or(self.default_input_size),
                _ => self.default_input_size,
            }
        };
        if shape.len() == 4 {
            (dim(3), dim(2))
        } else {
            (self.default_input_size, self.default_input_size)
        }
    }
}

/// Resize and normalize an RGB image into a `[1, 3, H, W]` tensor
pub fn preprocess(image: &RgbImage, width: u32, height: u32) -> InputTensor {
    let resized = if image.dimensions() == (width, height) {
        image.clone()
    } else {
        imageops::resize(image, width, height, FilterType::CatmullRom)
    };

    let plane = (width as usize) * (height as usize);
    let mut data = vec![0.0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            let v = pixel.0[c] as f32 / 255.0;
            data[c * plane + i] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    InputTensor {
        shape: [1, 3, height as usize, width as usize],
        data,
    }
}

fn raster_from_output(output: &OutputTensor) -> std::result::Result<DepthMap, InferenceError> {
    let (h, w) = output.raster_dims()?;
    // Leading dimensions are batch/channel of size 1; the raster is the tail
    let raw = &output.data[output.data.len() - h * w..];
    let (w32, h32) = match (u32::try_from(w), u32::try_from(h)) {
        (Ok(w32), Ok(h32)) => (w32, h32),
        _ => return Err(InferenceError::Shape(output.shape.clone())),
    };
    DepthMap::normalized_from_raw(w32, h32, raw)
        .ok_or_else(|| InferenceError::Shape(output.shape.clone()))
}
