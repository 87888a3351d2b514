//! Configuration for the reconstruction backends
//!
//! Loaded from `imgto3d.toml` (see `imgto3d_common::config` for file resolution).
//! Every field has a compiled default, so an empty or missing file is valid.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [camera]
//! focal_length = 1000.0
//! background_threshold = 0.1
//!
//! [ai]
//! subsample_stride = 4
//!
//! [pipeline]
//! colmap_binary = "colmap"
//! fast_mode = true
//! ```

use crate::projection::CameraParams;
use imgto3d_common::config::{load_toml_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR};
use imgto3d_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fallback model input edge when the model declares a dynamic dimension
pub const DEFAULT_MODEL_INPUT_SIZE: u32 = 384;

/// Default sampling stride for back-projection
pub const DEFAULT_SUBSAMPLE_STRIDE: u32 = 4;

/// Default number of trailing output characters kept for stage failures
pub const DEFAULT_LOG_TAIL_CHARS: usize = 500;

/// Complete reconstruction configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub logging: LoggingConfig,
    pub camera: CameraParams,
    pub ai: AiSettings,
    pub pipeline: PipelineSettings,
}

/// AI backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    /// Pixel stride used when back-projecting depth maps (trades density for volume)
    pub subsample_stride: u32,
    /// Model input edge used when the model's input shape is dynamic
    pub default_input_size: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            subsample_stride: DEFAULT_SUBSAMPLE_STRIDE,
            default_input_size: DEFAULT_MODEL_INPUT_SIZE,
        }
    }
}

/// External pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Photogrammetry toolchain executable
    pub colmap_binary: String,
    /// Export the sparse model directly instead of running dense stereo
    pub fast_mode: bool,
    /// `--max_image_size` passed to the undistortion stage
    pub max_image_size: u32,
    /// Trailing characters of stage output kept for failure messages
    pub log_tail_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            colmap_binary: "colmap".to_string(),
            fast_mode: true,
            max_image_size: 2000,
            log_tail_chars: DEFAULT_LOG_TAIL_CHARS,
        }
    }
}

impl ReconConfig {
    /// Resolve and load the config file
    ///
    /// **Priority:** CLI path → `IMGTO3D_CONFIG` → per-user config dir → defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR);
        let config: ReconConfig = load_toml_or_default(path.as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ReconConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the algorithms cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.ai.subsample_stride == 0 {
            return Err(Error::Config("ai.subsample_stride must be >= 1".to_string()));
        }
        if self.ai.default_input_size == 0 {
            return Err(Error::Config("ai.default_input_size must be >= 1".to_string()));
        }
        if self.camera.focal_length <= 0.0 {
            return Err(Error::Config("camera.focal_length must be positive".to_string()));
        }
        if self.camera.depth_bias <= 0.0 {
            return Err(Error::Config("camera.depth_bias must be positive".to_string()));
        }
        if self.pipeline.colmap_binary.trim().is_empty() {
            return Err(Error::Config("pipeline.colmap_binary must not be empty".to_string()));
        }
        Ok(())
    }
}
