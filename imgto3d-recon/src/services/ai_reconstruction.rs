//! AI reconstruction job
//!
//! Per-image loop: decode → infer depth → write preview → project → write PLY.
//! Runs synchronously; callers put it on a blocking worker.
//!
//! Per-image decode, inference and write failures skip that image. Model
//! load failures, an empty image set and cancellation end the job.

use crate::config::ReconConfig;
use crate::depth::{DepthEstimationEngine, ModelLoader};
use crate::projection::PointCloudProjector;
use crate::services::image_scanner::ImageScanner;
use crate::workspace::{self, WorkspaceWriter};
use imgto3d_common::{Error, EventSink, ReconEvent, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Percent reported once the model is loading
const LOADING_PERCENT: i32 = 1;

/// Percent reported once the model is ready
const MODEL_READY_PERCENT: i32 = 5;

/// Outcome counters of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiJobSummary {
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
}

/// Monocular depth reconstruction over one image folder
pub struct AiReconstructionJob {
    job_id: Uuid,
    images: PathBuf,
    model: PathBuf,
    workspace: Option<PathBuf>,
    engine: DepthEstimationEngine,
    projector: PointCloudProjector,
    scanner: ImageScanner,
    events: Arc<dyn EventSink>,
}

impl AiReconstructionJob {
    pub fn new(
        job_id: Uuid,
        images: impl Into<PathBuf>,
        model: impl Into<PathBuf>,
        loader: Arc<dyn ModelLoader>,
        config: &ReconConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            job_id,
            images: images.into(),
            model: model.into(),
            workspace: None,
            engine: DepthEstimationEngine::new(loader, config.ai.default_input_size),
            projector: PointCloudProjector::new(config.camera, config.ai.subsample_stride),
            scanner: ImageScanner::new(),
            events,
        }
    }

    /// Write into `workspace` instead of the sibling `<folder>_ai_workspace`
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Run to completion; returns the workspace path
    pub fn run(self, cancel: &CancellationToken) -> Result<PathBuf> {
        self.run_with_summary(cancel).map(|(path, _)| path)
    }

    /// Run to completion; returns the workspace path and per-image counters
    pub fn run_with_summary(mut self, cancel: &CancellationToken) -> Result<(PathBuf, AiJobSummary)> {
        let start = Instant::now();

        if !self.images.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Images folder {} does not exist",
                self.images.display()
            )));
        }
        let workspace_path = match self.workspace.take() {
            Some(ws) => ws,
            None => workspace::ai_workspace_for(&self.images)?,
        };
        workspace::ensure_workspace_separate(&self.images, &workspace_path)?;
        let writer = WorkspaceWriter::create(&workspace_path)?;
        self.progress(format!("Workspace: {}", writer.root().display()), 0);

        // Phase 1: model
        let model_name = self
            .model
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.model.display().to_string());
        self.progress(format!("Loading model: {}", model_name), LOADING_PERCENT);
        self.engine.load(&self.model)?;
        if let Some((w, h)) = self.engine.input_size() {
            self.progress(format!("Model ready ({}x{})", w, h), MODEL_READY_PERCENT);
        }

        // Phase 2: images
        let images = self.scanner.scan(&self.images)?;
        if images.is_empty() {
            return Err(Error::NoImagesFound(self.images.clone()));
        }

        let total = images.len();
        let mut summary = AiJobSummary {
            total,
            ..Default::default()
        };
        info!(job_id = %self.job_id, images = total, "Starting depth reconstruction");

        // Phase 3: per-image loop
        for (index, image_path) in images.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(job_id = %self.job_id, processed = index, "Cancelled before next image");
                return Err(Error::Cancelled);
            }

            let name = display_name(image_path);
            self.progress(format!("AI [{}/{}]: {}", index + 1, total, name), -1);

            match self.process_image(image_path, &writer, cancel) {
                Ok(true) => summary.written += 1,
                Ok(false) => summary.skipped += 1,
                Err(Error::Cancelled) => {
                    info!(job_id = %self.job_id, image = %name, "Cancelled mid-image");
                    return Err(Error::Cancelled);
                }
                Err(e) => {
                    warn!(job_id = %self.job_id, image = %name, "Skipping image: {}", e);
                    summary.skipped += 1;
                }
            }

            let percent = ((index + 1) * 100 / total) as i32;
            self.progress(format!("Processed {}", name), percent);
        }

        info!(
            job_id = %self.job_id,
            written = summary.written,
            skipped = summary.skipped,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Depth reconstruction complete"
        );
        Ok((writer.root().to_path_buf(), summary))
    }

    /// Returns `Ok(false)` when the image was skipped, `Err(Cancelled)` on cancellation
    fn process_image(
        &mut self,
        image_path: &Path,
        writer: &WorkspaceWriter,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let color = match image::open(image_path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!(image = %image_path.display(), "Decode failed: {}", e);
                return Ok(false);
            }
        };

        let Some(depth) = self.engine.infer(&color, cancel) else {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            warn!(image = %image_path.display(), "No depth produced");
            return Ok(false);
        };

        let stats = depth.stats();
        debug!(
            image = %image_path.display(),
            min = stats.min,
            max = stats.max,
            mean = stats.mean,
            "Depth statistics"
        );

        WorkspaceWriter::save_depth_preview(&writer.depth_preview_path(image_path), &depth)?;

        let cloud = self
            .projector
            .project_cancellable(&depth, &color, cancel)
            .ok_or(Error::Cancelled)?;

        WorkspaceWriter::save_point_cloud_ply(&writer.point_cloud_path(image_path), &cloud)?;
        debug!(image = %image_path.display(), points = cloud.len(), "Image reconstructed");
        Ok(true)
    }

    fn progress(&self, message: impl Into<String>, percent: i32) {
        self.events
            .emit(ReconEvent::progress(self.job_id, message, percent));
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
