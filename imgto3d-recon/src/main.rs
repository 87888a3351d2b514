//! imgto3d - photos to 3D point clouds
//!
//! Command-line front end for the two reconstruction backends:
//! - `ai`: monocular depth per image, one PLY per photo
//! - `pipeline`: external structure-from-motion (+ optional dense stereo)
//! - `dense`: dense stereo and fusion on an existing sparse workspace
//!
//! Progress is printed as it arrives. Ctrl+C cancels the running job.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use imgto3d_common::{EventBus, ReconEvent};
use imgto3d_recon::depth::ModelLoaderRegistry;
use imgto3d_recon::{workspace, JobHandle, ReconConfig, ReconService};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for imgto3d
#[derive(Parser, Debug)]
#[command(name = "imgto3d")]
#[command(about = "Reconstruct 3D point clouds from a folder of photos")]
#[command(version)]
struct Args {
    /// Config file (overrides IMGTO3D_CONFIG and the per-user config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monocular depth estimation + back-projection
    Ai {
        /// Folder of .jpg/.jpeg/.png images
        images: PathBuf,

        /// Depth model file (.onnx with `with-ort`, .pt with `with-tch`)
        #[arg(short, long, env = "IMGTO3D_MODEL")]
        model: PathBuf,

        /// Workspace (default: <images>_ai_workspace)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Back-projection pixel stride
        #[arg(long)]
        stride: Option<u32>,
    },

    /// External photogrammetry pipeline
    Pipeline {
        /// Folder of images
        images: PathBuf,

        /// Workspace, deleted and recreated (default: <images>_workspace)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export the sparse model directly
        #[arg(long, conflicts_with = "full")]
        fast: bool,

        /// Dense stereo, fusion and meshing
        #[arg(long)]
        full: bool,

        /// Photogrammetry tool executable
        #[arg(long, env = "IMGTO3D_COLMAP")]
        colmap: Option<String>,
    },

    /// Dense stereo + fusion on a workspace that already holds sparse/0
    Dense {
        /// Folder of images used for the sparse model
        images: PathBuf,

        /// Existing pipeline workspace
        #[arg(short, long)]
        workspace: PathBuf,

        /// Photogrammetry tool executable
        #[arg(long, env = "IMGTO3D_COLMAP")]
        colmap: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        ReconConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args.command);
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    let level = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("imgto3d={level},imgto3d_recon={level},imgto3d_common={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting {}", build_info());

    let event_bus = EventBus::default();
    let mut events = event_bus.subscribe();
    let loader = Arc::new(ModelLoaderRegistry::with_compiled_runtimes());
    let service = ReconService::with_process_runner(config, Arc::new(event_bus), loader);

    let handle = submit(&service, args.command)
        .await
        .context("Failed to start job")?;
    let job_id = handle.job_id();
    let cancel = handle.cancel_token();

    let json = args.json;
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.job_id() == job_id => {
                    print_event(&event, json);
                    if event.is_terminal() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("Dropped {} progress events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let wait = handle.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        result = &mut wait => result,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, cancelling job");
            cancel.cancel();
            wait.await
        }
    };

    if let Err(e) = printer.await {
        warn!("Event printer stopped: {}", e);
    }

    let result_path = result.context("Reconstruction failed")?;
    info!("Result: {}", result_path.display());
    Ok(())
}

/// Version line with the identification captured by build.rs
fn build_info() -> String {
    format!(
        "imgto3d v{} ({} built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    )
}

fn apply_overrides(config: &mut ReconConfig, command: &Command) {
    match command {
        Command::Ai { stride, .. } => {
            if let Some(stride) = stride {
                config.ai.subsample_stride = *stride;
            }
        }
        Command::Pipeline {
            fast, full, colmap, ..
        } => {
            if *fast {
                config.pipeline.fast_mode = true;
            }
            if *full {
                config.pipeline.fast_mode = false;
            }
            if let Some(colmap) = colmap {
                config.pipeline.colmap_binary = colmap.clone();
            }
        }
        Command::Dense { colmap, .. } => {
            if let Some(colmap) = colmap {
                config.pipeline.colmap_binary = colmap.clone();
            }
        }
    }
}

async fn submit(service: &ReconService, command: Command) -> Result<JobHandle> {
    let handle = match command {
        Command::Ai {
            images,
            model,
            output,
            ..
        } => {
            service
                .submit_ai_job_with_workspace(images, model, output)
                .await?
        }
        Command::Pipeline { images, output, .. } => {
            let output = match output {
                Some(output) => output,
                None => workspace::default_pipeline_workspace(&images)?,
            };
            service.submit_pipeline_job(images, output).await?
        }
        Command::Dense {
            images, workspace, ..
        } => service.submit_dense_job(images, workspace).await?,
    };
    Ok(handle)
}

fn print_event(event: &ReconEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
        return;
    }

    match event {
        ReconEvent::JobStarted { backend, .. } => println!("Started {:?} job", backend),
        ReconEvent::Progress {
            message, percent, ..
        } => {
            if *percent >= 0 {
                println!("[{:>3}%] {}", percent, message.trim_end());
            } else {
                println!("       {}", message.trim_end());
            }
        }
        ReconEvent::Finished { result_path, .. } => println!("Finished: {}", result_path),
        ReconEvent::Failed { code, message, .. } => eprintln!("Error [{}]: {}", code, message),
    }
}
