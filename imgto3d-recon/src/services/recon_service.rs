//! Job submission service
//!
//! Accepts AI and pipeline jobs, runs each on its own worker and reports
//! through the event sink. One job runs at a time per service instance.
//!
//! Event stream per job: `JobStarted`, progress..., then exactly one of
//! `Finished` / `Failed`. The active-job slot is released before the terminal
//! event is emitted.

use crate::config::ReconConfig;
use crate::depth::ModelLoader;
use crate::services::ai_reconstruction::AiReconstructionJob;
use crate::services::pipeline_orchestrator::{PipelineOrchestrator, PipelineProfile};
use crate::services::stage_runner::{ProcessStageRunner, StageRunner};
use chrono::Utc;
use imgto3d_common::events::BackendKind;
use imgto3d_common::{Error, EventSink, ReconEvent, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// Handle to a submitted job
#[derive(Debug)]
pub struct JobHandle {
    job_id: Uuid,
    cancel: CancellationToken,
    join: JoinHandle<Result<PathBuf>>,
}

impl JobHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Request cancellation; the job stops at its next checkpoint
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the job's result (the terminal event has been emitted by then)
    pub async fn wait(self) -> Result<PathBuf> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(worker_failure(e)),
        }
    }
}

/// Reconstruction job service
#[derive(Clone)]
pub struct ReconService {
    config: Arc<ReconConfig>,
    events: Arc<dyn EventSink>,
    loader: Arc<dyn ModelLoader>,
    runner: Arc<dyn StageRunner>,
    /// Cancellation tokens of active jobs (at most one)
    active_jobs: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl ReconService {
    pub fn new(
        config: ReconConfig,
        events: Arc<dyn EventSink>,
        loader: Arc<dyn ModelLoader>,
        runner: Arc<dyn StageRunner>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            events,
            loader,
            runner,
            active_jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Service running stages as real child processes
    pub fn with_process_runner(
        config: ReconConfig,
        events: Arc<dyn EventSink>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        let runner = Arc::new(ProcessStageRunner::new(config.pipeline.log_tail_chars));
        Self::new(config, events, loader, runner)
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    /// Currently running job, if any
    pub async fn active_job(&self) -> Option<Uuid> {
        self.active_jobs.read().await.keys().next().copied()
    }

    /// Cancel job `job_id`; `false` if it is not running
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        match self.active_jobs.read().await.get(&job_id) {
            Some(token) => {
                info!(job_id = %job_id, "Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Depth-estimate every image into the sibling `<folder>_ai_workspace`
    pub async fn submit_ai_job(
        &self,
        images: impl Into<PathBuf>,
        model: impl Into<PathBuf>,
    ) -> Result<JobHandle> {
        self.submit_ai_job_with_workspace(images, model, None).await
    }

    /// Same as [`submit_ai_job`](Self::submit_ai_job) with an explicit workspace
    pub async fn submit_ai_job_with_workspace(
        &self,
        images: impl Into<PathBuf>,
        model: impl Into<PathBuf>,
        workspace: Option<PathBuf>,
    ) -> Result<JobHandle> {
        let (job_id, cancel) = self.reserve().await?;
        let images = images.into();
        let mut job = AiReconstructionJob::new(
            job_id,
            &images,
            model.into(),
            self.loader.clone(),
            &self.config,
            self.events.clone(),
        );
        if let Some(ws) = workspace {
            job = job.with_workspace(ws);
        }
        info!(job_id = %job_id, images = %images.display(), "AI job accepted");

        let service = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            service.emit_started(job_id, BackendKind::Ai);
            let result = match tokio::task::spawn_blocking(move || job.run(&token)).await {
                Ok(result) => result,
                Err(e) => Err(worker_failure(e)),
            };
            service.complete(job_id, result).await
        });

        Ok(JobHandle {
            job_id,
            cancel,
            join,
        })
    }

    /// Run the external pipeline into `output` using the configured mode
    pub async fn submit_pipeline_job(
        &self,
        images: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Result<JobHandle> {
        let profile = PipelineProfile::from_fast_mode(self.config.pipeline.fast_mode);
        self.submit_pipeline(images.into(), output.into(), profile).await
    }

    /// Dense stereo and fusion on an existing sparse workspace
    pub async fn submit_dense_job(
        &self,
        images: impl Into<PathBuf>,
        workspace: impl Into<PathBuf>,
    ) -> Result<JobHandle> {
        self.submit_pipeline(images.into(), workspace.into(), PipelineProfile::DenseOnly)
            .await
    }

    async fn submit_pipeline(
        &self,
        images: PathBuf,
        workspace: PathBuf,
        profile: PipelineProfile,
    ) -> Result<JobHandle> {
        let (job_id, cancel) = self.reserve().await?;
        info!(
            job_id = %job_id,
            images = %images.display(),
            workspace = %workspace.display(),
            profile = %profile,
            "Pipeline job accepted"
        );

        let orchestrator = PipelineOrchestrator::new(
            self.runner.clone(),
            self.events.clone(),
            self.config.pipeline.clone(),
        );
        let service = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            service.emit_started(job_id, BackendKind::ExternalPipeline);
            let result = orchestrator
                .run(job_id, &images, &workspace, profile, &token)
                .await;
            service.complete(job_id, result).await
        });

        Ok(JobHandle {
            job_id,
            cancel,
            join,
        })
    }

    /// Claim the single job slot
    async fn reserve(&self) -> Result<(Uuid, CancellationToken)> {
        let mut jobs = self.active_jobs.write().await;
        if !jobs.is_empty() {
            return Err(Error::JobAlreadyRunning);
        }
        let job_id = Uuid::new_v4();
        let token = CancellationToken::new();
        jobs.insert(job_id, token.clone());
        Ok((job_id, token))
    }

    fn emit_started(&self, job_id: Uuid, backend: BackendKind) {
        self.events.emit(ReconEvent::JobStarted {
            job_id,
            backend,
            timestamp: Utc::now(),
        });
    }

    /// Release the slot, then emit the single terminal event
    async fn complete(&self, job_id: Uuid, result: Result<PathBuf>) -> Result<PathBuf> {
        self.active_jobs.write().await.remove(&job_id);

        match &result {
            Ok(path) => {
                info!(job_id = %job_id, result = %path.display(), "Job finished");
                self.events
                    .emit(ReconEvent::finished(job_id, path.display().to_string()));
            }
            Err(e) => {
                if e.is_cancelled() {
                    info!(job_id = %job_id, "Job cancelled");
                } else {
                    error!(job_id = %job_id, code = e.code(), "Job failed: {}", e);
                }
                self.events.emit(ReconEvent::failed(job_id, e));
            }
        }
        result
    }
}

fn worker_failure(e: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::other(format!("Job worker failed: {}", e)))
}
