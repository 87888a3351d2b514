//! Common error types for imgto3d
//!
//! Every terminal job failure maps onto one variant here. Recoverable per-image
//! failures in the AI backend never reach this type; they are logged and skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for reconstruction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the reconstruction backends
#[derive(Error, Debug)]
pub enum Error {
    /// Model file does not exist at the given path
    #[error("Model file not found: {}", .0.display())]
    ModelMissing(PathBuf),

    /// Inference engine failed to parse or load the model
    #[error("Invalid model: {0}")]
    ModelInvalid(String),

    /// Source directory holds no image with an accepted extension
    #[error("No images found in {}", .0.display())]
    NoImagesFound(PathBuf),

    /// Workspace directory could not be created
    #[error("Failed to create workspace {}: {source}", path.display())]
    WorkspaceCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Workspace resolves to (or overlaps) the source images directory
    #[error(
        "Workspace {} must not equal or overlap the source images directory {}",
        workspace.display(),
        source_dir.display()
    )]
    WorkspaceEqualsSource {
        source_dir: PathBuf,
        workspace: PathBuf,
    },

    /// External pipeline stage exited with a failure status
    #[error("Stage {stage} failed (exit code {}).\n\nLog:\n{log_tail}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    ExternalStageFailed {
        stage: String,
        exit_code: Option<i32>,
        log_tail: String,
    },

    /// Pipeline finished but the expected result file is absent
    #[error("Expected output missing: {}", .0.display())]
    ExpectedOutputMissing(PathBuf),

    /// Job stopped because the caller requested cancellation
    #[error("Cancelled by caller")]
    Cancelled,

    /// A job is already running on this service instance
    #[error("A reconstruction job is already running")]
    JobAlreadyRunning,

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input (missing directories, bad arguments)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Raster encoding or decoding error
    #[error("Encode error: {0}")]
    Encode(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code carried in error events
    pub fn code(&self) -> &'static str {
        match self {
            Error::ModelMissing(_) => "MODEL_MISSING",
            Error::ModelInvalid(_) => "MODEL_INVALID",
            Error::NoImagesFound(_) => "NO_IMAGES_FOUND",
            Error::WorkspaceCreateFailed { .. } => "WORKSPACE_CREATE_FAILED",
            Error::WorkspaceEqualsSource { .. } => "WORKSPACE_EQUALS_SOURCE",
            Error::ExternalStageFailed { .. } => "EXTERNAL_STAGE_FAILED",
            Error::ExpectedOutputMissing(_) => "EXPECTED_OUTPUT_MISSING",
            Error::Cancelled => "CANCELLED",
            Error::JobAlreadyRunning => "JOB_ALREADY_RUNNING",
            Error::Config(_) => "CONFIG_ERROR",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::Encode(_) => "ENCODE_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// True when the error reports caller cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
