//! External photogrammetry pipeline orchestrator
//!
//! # Stage Progression
//! - fast: FeatureExtraction → FeatureMatching → SparseReconstruction → FastExport → Done
//! - full: ... → SparseReconstruction → Undistort → DenseStereo → Fusion → Meshing → Done
//! - dense-only: Undistort → DenseStereo → Fusion → Done (existing sparse model)
//!
//! Each stage is one external process. A non-zero exit fails the job, except
//! the first DenseStereo failure, which retries the stage once with CPU-only
//! arguments. Cancellation kills the running process.

mod progress;
mod stages;

pub use progress::{BracketProgressSniffer, ProgressSniffer};
pub use stages::{PipelineProfile, PipelineStage, ProgressWindow, StageOptions, StagePaths};

use crate::config::PipelineSettings;
use crate::services::stage_runner::{StageInvocation, StageRunner};
use crate::workspace;
use imgto3d_common::{Error, EventSink, ReconEvent, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Mutable state of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRunState {
    pub current: PipelineStage,
    pub profile: PipelineProfile,
    /// Flips false → true at most once per run
    pub fallback_to_cpu: bool,
    pub paths: StagePaths,
}

impl PipelineRunState {
    pub fn new(profile: PipelineProfile, paths: StagePaths) -> Self {
        Self {
            current: profile.first_stage(),
            profile,
            fallback_to_cpu: false,
            paths,
        }
    }

    /// Move to the next stage after a successful exit
    pub fn advance(&mut self) {
        self.current = self.current.next(self.profile);
    }

    /// Decide whether a failed stage gets its one retry
    ///
    /// Returns `true` (and records the fallback) only for the first
    /// DenseStereo failure.
    pub fn try_fallback(&mut self) -> bool {
        if self.current == PipelineStage::DenseStereo && !self.fallback_to_cpu {
            self.fallback_to_cpu = true;
            true
        } else {
            false
        }
    }

    pub fn is_done(&self) -> bool {
        self.current == PipelineStage::Done
    }
}

/// Pipeline orchestrator service
pub struct PipelineOrchestrator {
    runner: Arc<dyn StageRunner>,
    sniffer: Arc<dyn ProgressSniffer>,
    events: Arc<dyn EventSink>,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        runner: Arc<dyn StageRunner>,
        events: Arc<dyn EventSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            runner,
            sniffer: Arc::new(BracketProgressSniffer),
            events,
            settings,
        }
    }

    /// Replace the `[current/total]` progress parser
    pub fn with_sniffer(mut self, sniffer: Arc<dyn ProgressSniffer>) -> Self {
        self.sniffer = sniffer;
        self
    }

    /// Execute the pipeline; returns the result file path
    ///
    /// Any existing `workspace` is deleted first, except under
    /// [`PipelineProfile::DenseOnly`], which builds on its sparse model.
    pub async fn run(
        &self,
        job_id: Uuid,
        images: &Path,
        workspace: &Path,
        profile: PipelineProfile,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let start = Instant::now();
        info!(
            job_id = %job_id,
            images = %images.display(),
            workspace = %workspace.display(),
            profile = %profile,
            "Starting reconstruction pipeline"
        );

        // Phase 1: preflight, nothing on disk changes before these pass
        if !images.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Images folder {} does not exist",
                images.display()
            )));
        }
        workspace::ensure_workspace_separate(images, workspace)?;

        let paths = StagePaths::new(workspace, images);
        self.prepare_workspace(&paths, profile)?;

        // Phase 2: stages
        let mut state = PipelineRunState::new(profile, paths);
        while !state.is_done() {
            if cancel.is_cancelled() {
                info!(job_id = %job_id, stage = %state.current, "Cancelled before stage start");
                return Err(Error::Cancelled);
            }
            self.execute_stage(job_id, &mut state, cancel).await?;
        }

        // Phase 3: result
        let result = state.paths.result(profile);
        if !result.is_file() {
            error!(job_id = %job_id, path = %result.display(), "Expected output missing");
            return Err(Error::ExpectedOutputMissing(result));
        }

        info!(
            job_id = %job_id,
            result = %result.display(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Pipeline complete"
        );
        self.emit(job_id, "Reconstruction complete", 100);
        Ok(result)
    }

    fn prepare_workspace(&self, paths: &StagePaths, profile: PipelineProfile) -> Result<()> {
        let ws = &paths.workspace;
        if profile.starts_clean() {
            if ws.exists() {
                info!(workspace = %ws.display(), "Removing previous workspace");
                std::fs::remove_dir_all(ws).map_err(|source| Error::WorkspaceCreateFailed {
                    path: ws.clone(),
                    source,
                })?;
            }
            std::fs::create_dir_all(ws).map_err(|source| Error::WorkspaceCreateFailed {
                path: ws.clone(),
                source,
            })?;
        } else if !paths.sparse_model().is_dir() {
            return Err(Error::InvalidInput(format!(
                "No sparse model at {}",
                paths.sparse_model().display()
            )));
        }
        Ok(())
    }

    /// Run `state.current` once and update `state` from its outcome
    async fn execute_stage(
        &self,
        job_id: Uuid,
        state: &mut PipelineRunState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let stage = state.current;
        let window = stage.window();
        self.emit(job_id, stage.label(state.fallback_to_cpu), window.base);

        match stage {
            PipelineStage::SparseReconstruction => create_dir(&state.paths.sparse())?,
            PipelineStage::Undistort => create_dir(&state.paths.dense())?,
            _ => {}
        }

        let options = StageOptions {
            cpu_fallback: state.fallback_to_cpu,
            max_image_size: self.settings.max_image_size,
        };
        let invocation = StageInvocation {
            stage: stage.to_string(),
            program: self.settings.colmap_binary.clone(),
            args: stage.arguments(&state.paths, &options),
        };
        info!(job_id = %job_id, stage = %stage, "Running: {}", invocation);

        let sniffer = &self.sniffer;
        let events = &self.events;
        let on_line = move |line: &str| {
            let percent = sniffer
                .sniff(line)
                .map_or(-1, |(current, total)| window.map(current, total));
            events.emit(ReconEvent::progress(job_id, line, percent));
        };

        let started = Instant::now();
        let outcome = self.runner.run(&invocation, &on_line, cancel).await?;

        if outcome.cancelled {
            info!(job_id = %job_id, stage = %stage, "Stage cancelled");
            return Err(Error::Cancelled);
        }

        if outcome.success() {
            info!(
                job_id = %job_id,
                stage = %stage,
                elapsed_secs = started.elapsed().as_secs_f64(),
                "Stage finished"
            );
            if state.profile == PipelineProfile::DenseOnly
                && stage == PipelineStage::DenseStereo
                && !state.paths.fusion_config().is_file()
            {
                return Err(Error::ExpectedOutputMissing(state.paths.fusion_config()));
            }
            state.advance();
            return Ok(());
        }

        if state.try_fallback() {
            warn!(
                job_id = %job_id,
                exit_code = ?outcome.exit_code,
                "Dense stereo failed, retrying on CPU"
            );
            return Ok(());
        }

        error!(
            job_id = %job_id,
            stage = %stage,
            exit_code = ?outcome.exit_code,
            "Stage failed"
        );
        Err(Error::ExternalStageFailed {
            stage: stage.to_string(),
            exit_code: outcome.exit_code,
            log_tail: outcome.output_tail,
        })
    }

    fn emit(&self, job_id: Uuid, message: &str, percent: i32) {
        self.events
            .emit(ReconEvent::progress(job_id, message, percent));
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| Error::WorkspaceCreateFailed {
        path: path.to_path_buf(),
        source,
    })
}
