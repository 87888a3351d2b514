//! Pipeline stages, their order, progress windows and command lines

use std::fmt;
use std::path::{Path, PathBuf};

/// Which stage sequence a run follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineProfile {
    /// Sparse reconstruction exported directly as the result
    Fast,
    /// Sparse reconstruction followed by dense stereo, fusion and meshing
    Full,
    /// Dense stereo and fusion on an existing sparse model
    DenseOnly,
}

impl PipelineProfile {
    pub fn from_fast_mode(fast_mode: bool) -> Self {
        if fast_mode {
            PipelineProfile::Fast
        } else {
            PipelineProfile::Full
        }
    }

    /// First stage executed under this profile
    pub fn first_stage(self) -> PipelineStage {
        match self {
            PipelineProfile::Fast | PipelineProfile::Full => PipelineStage::FeatureExtraction,
            PipelineProfile::DenseOnly => PipelineStage::Undistort,
        }
    }

    /// Whether the workspace is wiped before the first stage
    pub fn starts_clean(self) -> bool {
        !matches!(self, PipelineProfile::DenseOnly)
    }
}

impl fmt::Display for PipelineProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineProfile::Fast => "fast",
            PipelineProfile::Full => "full",
            PipelineProfile::DenseOnly => "dense-only",
        };
        f.write_str(s)
    }
}

/// One step of the external pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    FeatureExtraction,
    FeatureMatching,
    SparseReconstruction,
    FastExport,
    Undistort,
    DenseStereo,
    Fusion,
    Meshing,
    Done,
}

/// Global progress window of a stage: `[base, base + range]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressWindow {
    pub base: i32,
    pub range: i32,
}

impl ProgressWindow {
    /// Map `current / total` linearly into the window
    pub fn map(&self, current: u64, total: u64) -> i32 {
        if total == 0 {
            return self.base;
        }
        let fraction = current.min(total) as f64 / total as f64;
        self.base + (fraction * self.range as f64).floor() as i32
    }

    pub fn end(&self) -> i32 {
        self.base + self.range
    }
}

impl PipelineStage {
    /// Stage that follows `self` under `profile`; `Done` is absorbing
    pub fn next(self, profile: PipelineProfile) -> PipelineStage {
        use PipelineStage::*;
        match self {
            FeatureExtraction => FeatureMatching,
            FeatureMatching => SparseReconstruction,
            SparseReconstruction => match profile {
                PipelineProfile::Fast => FastExport,
                _ => Undistort,
            },
            FastExport => Done,
            Undistort => DenseStereo,
            DenseStereo => Fusion,
            Fusion => match profile {
                PipelineProfile::DenseOnly => Done,
                _ => Meshing,
            },
            Meshing => Done,
            Done => Done,
        }
    }

    pub fn window(self) -> ProgressWindow {
        use PipelineStage::*;
        let (base, range) = match self {
            FeatureExtraction => (0, 15),
            FeatureMatching => (15, 15),
            SparseReconstruction => (30, 25),
            FastExport => (55, 35),
            Undistort => (55, 5),
            DenseStereo => (60, 25),
            Fusion => (85, 10),
            Meshing => (95, 5),
            Done => (100, 0),
        };
        ProgressWindow { base, range }
    }

    /// Dense stages never run under the fast profile
    pub fn skipped_in_fast_mode(self) -> bool {
        matches!(
            self,
            PipelineStage::Undistort
                | PipelineStage::DenseStereo
                | PipelineStage::Fusion
                | PipelineStage::Meshing
        )
    }

    /// Tool subcommand; `None` for `Done`
    pub fn subcommand(self) -> Option<&'static str> {
        use PipelineStage::*;
        match self {
            FeatureExtraction => Some("feature_extractor"),
            FeatureMatching => Some("exhaustive_matcher"),
            SparseReconstruction => Some("mapper"),
            FastExport => Some("model_converter"),
            Undistort => Some("image_undistorter"),
            DenseStereo => Some("patch_match_stereo"),
            Fusion => Some("stereo_fusion"),
            Meshing => Some("poisson_mesher"),
            Done => None,
        }
    }

    /// Human-readable start message
    pub fn label(self, cpu_fallback: bool) -> &'static str {
        use PipelineStage::*;
        match self {
            FeatureExtraction => "Extracting features...",
            FeatureMatching => "Matching features...",
            SparseReconstruction => "Sparse reconstruction...",
            FastExport => "Exporting point cloud...",
            Undistort => "Undistorting images...",
            DenseStereo if cpu_fallback => "Calculating depth maps (CPU fallback)...",
            DenseStereo => "Calculating depth maps (GPU)...",
            Fusion => "Fusing point cloud...",
            Meshing => "Generating mesh...",
            Done => "Done",
        }
    }

    /// Full argument list (subcommand first) for this stage
    pub fn arguments(self, paths: &StagePaths, options: &StageOptions) -> Vec<String> {
        use PipelineStage::*;
        let Some(subcommand) = self.subcommand() else {
            return Vec::new();
        };
        let mut args = vec![subcommand.to_string()];

        match self {
            FeatureExtraction => {
                args.push(path_arg("database_path", &paths.database()));
                args.push(path_arg("image_path", &paths.images));
            }
            FeatureMatching => {
                args.push(path_arg("database_path", &paths.database()));
            }
            SparseReconstruction => {
                args.push(path_arg("database_path", &paths.database()));
                args.push(path_arg("image_path", &paths.images));
                args.push(path_arg("output_path", &paths.sparse()));
            }
            FastExport => {
                args.push(path_arg("input_path", &paths.sparse_model()));
                args.push(path_arg("output_path", &paths.model()));
                args.push(arg("output_type", "PLY"));
            }
            Undistort => {
                args.push(path_arg("image_path", &paths.images));
                args.push(path_arg("input_path", &paths.sparse_model()));
                args.push(path_arg("output_path", &paths.dense()));
                args.push(arg("output_type", "COLMAP"));
                args.push(arg("max_image_size", &options.max_image_size.to_string()));
            }
            DenseStereo => {
                args.push(path_arg("workspace_path", &paths.dense()));
                args.push(arg("workspace_format", "COLMAP"));
                if options.cpu_fallback {
                    args.push(arg("PatchMatchStereo.geom_consistency", "false"));
                    args.push(arg("PatchMatchStereo.gpu_index", ""));
                } else {
                    args.push(arg("PatchMatchStereo.geom_consistency", "true"));
                }
            }
            Fusion => {
                args.push(path_arg("workspace_path", &paths.dense()));
                args.push(arg("workspace_format", "COLMAP"));
                args.push(arg("input_type", "geometric"));
                args.push(path_arg("output_path", &paths.fused()));
            }
            Meshing => {
                args.push(path_arg("input_path", &paths.fused()));
                args.push(path_arg("output_path", &paths.model()));
            }
            Done => {}
        }
        args
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-run argument switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOptions {
    pub cpu_fallback: bool,
    pub max_image_size: u32,
}

/// Workspace-relative locations used in stage arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePaths {
    pub workspace: PathBuf,
    pub images: PathBuf,
}

impl StagePaths {
    pub fn new(workspace: impl Into<PathBuf>, images: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            images: images.into(),
        }
    }

    pub fn database(&self) -> PathBuf {
        self.workspace.join("database.db")
    }

    pub fn sparse(&self) -> PathBuf {
        self.workspace.join("sparse")
    }

    /// First reconstructed sparse model
    pub fn sparse_model(&self) -> PathBuf {
        self.sparse().join("0")
    }

    pub fn dense(&self) -> PathBuf {
        self.workspace.join("dense")
    }

    pub fn fused(&self) -> PathBuf {
        self.dense().join("fused.ply")
    }

    /// Written by patch-match stereo; fusion cannot run without it
    pub fn fusion_config(&self) -> PathBuf {
        self.dense().join("stereo").join("fusion.cfg")
    }

    pub fn model(&self) -> PathBuf {
        self.workspace.join("model.ply")
    }

    /// Final artifact of a run under `profile`
    pub fn result(&self, profile: PipelineProfile) -> PathBuf {
        match profile {
            PipelineProfile::Fast | PipelineProfile::Full => self.model(),
            PipelineProfile::DenseOnly => self.fused(),
        }
    }
}

fn arg(key: &str, value: &str) -> String {
    format!("--{}={}", key, value)
}

fn path_arg(key: &str, value: &Path) -> String {
    arg(key, &value.display().to_string())
}
