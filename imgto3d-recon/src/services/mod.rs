//! Reconstruction services
//!
//! - `ai_reconstruction`: per-image depth estimation job
//! - `pipeline_orchestrator`: external structure-from-motion / MVS stage machine
//! - `stage_runner`: one external tool invocation
//! - `recon_service`: job submission, single-job slot and terminal events

pub mod ai_reconstruction;
pub mod image_scanner;
pub mod pipeline_orchestrator;
pub mod recon_service;
pub mod stage_runner;

pub use ai_reconstruction::{AiJobSummary, AiReconstructionJob};
pub use image_scanner::ImageScanner;
pub use pipeline_orchestrator::{
    BracketProgressSniffer, PipelineOrchestrator, PipelineProfile, PipelineRunState,
    PipelineStage, ProgressSniffer,
};
pub use recon_service::{JobHandle, ReconService};
pub use stage_runner::{LineSink, ProcessStageRunner, StageInvocation, StageOutcome, StageRunner};
