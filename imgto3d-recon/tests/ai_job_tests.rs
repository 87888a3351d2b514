//! AI reconstruction job integration tests
//!
//! Runs the per-image depth job against a deterministic fake model and real
//! images on disk, checking workspace contents and progress events.

mod helpers;

use helpers::fake_model::write_model_file;
use helpers::*;
use imgto3d_common::Error;
use imgto3d_recon::services::AiReconstructionJob;
use imgto3d_recon::workspace::read_point_cloud_ply;
use imgto3d_recon::ReconConfig;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn job(
    images: &Path,
    model: &Path,
    loader: Arc<FakeModelLoader>,
    sink: Arc<RecordingSink>,
) -> AiReconstructionJob {
    AiReconstructionJob::new(
        Uuid::new_v4(),
        images,
        model,
        loader,
        &ReconConfig::default(),
        sink,
    )
}

fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(suffix))
        .collect();
    names.sort();
    names
}

/// Every image yields a depth preview and a point cloud
#[test]
fn test_writes_preview_and_cloud_per_image() {
    // Given: three images and a working model
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 3);
    let model = write_model_file(temp.path(), "dpt_hybrid.pt");
    let sink = Arc::new(RecordingSink::new());

    // When: running the job
    let result = job(
        &images,
        &model,
        Arc::new(FakeModelLoader::new(FakeOutput::Ramp)),
        sink.clone(),
    )
    .run_with_summary(&CancellationToken::new());

    // Then: sibling workspace holds one PNG + one PLY per image
    let (workspace, summary) = result.unwrap();
    assert_eq!(workspace, temp.path().join("photos_ai_workspace"));
    assert_eq!(summary.total, 3);
    assert_eq!(summary.written, 3);
    assert_eq!(summary.skipped, 0);
    assert_eq!(
        files_with_suffix(&workspace, ".ply"),
        vec!["img_00.ply", "img_01.ply", "img_02.ply"]
    );
    assert_eq!(
        files_with_suffix(&workspace, "_depth.png"),
        vec!["img_00_depth.png", "img_01_depth.png", "img_02_depth.png"]
    );

    // And: clouds are readable and respect the depth clamp
    let points = read_point_cloud_ply(&workspace.join("img_00.ply")).unwrap();
    assert!(!points.is_empty());
    let clamp = ReconConfig::default().camera.z_clamp;
    assert!(points.iter().all(|p| p.z > 0.0 && p.z <= clamp));
}

/// Progress messages and percents follow the per-image loop
#[test]
fn test_progress_events_per_image() {
    // Given: three images
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 3);
    let model = write_model_file(temp.path(), "model.pt");
    let sink = Arc::new(RecordingSink::new());

    // When
    job(
        &images,
        &model,
        Arc::new(FakeModelLoader::new(FakeOutput::Ramp)),
        sink.clone(),
    )
    .run(&CancellationToken::new())
    .unwrap();

    // Then: "AI [i/n]" per image, completion percents 33/66/100
    let messages = sink.messages();
    assert!(messages.iter().any(|m| m.starts_with("Loading model: model.pt")));
    assert!(messages.iter().any(|m| m == "Model ready (16x16)"));
    for expected in ["AI [1/3]: img_00.png", "AI [2/3]: img_01.png", "AI [3/3]: img_02.png"] {
        assert!(messages.iter().any(|m| m == expected), "missing {}", expected);
    }

    let percents = sink.percents();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert!(percents.ends_with(&[33, 66, 100]), "{:?}", percents);

    // And: the job itself emits no terminal event
    assert!(sink.terminal_events().is_empty());
}

/// Degenerate (flat) model output yields empty clouds, not a failure
#[test]
fn test_flat_depth_writes_empty_cloud() {
    // Given: a model that predicts the same value everywhere
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 1);
    let model = write_model_file(temp.path(), "model.pt");

    // When
    let workspace = job(
        &images,
        &model,
        Arc::new(FakeModelLoader::new(FakeOutput::Flat(0.2))),
        Arc::new(RecordingSink::new()),
    )
    .run(&CancellationToken::new())
    .unwrap();

    // Then: a valid PLY with zero vertices and an all-black preview
    let ply = std::fs::read_to_string(workspace.join("img_00.ply")).unwrap();
    assert!(ply.contains("element vertex 0\n"));
    assert!(read_point_cloud_ply(&workspace.join("img_00.ply"))
        .unwrap()
        .is_empty());

    let preview = image::open(workspace.join("img_00_depth.png"))
        .unwrap()
        .to_luma8();
    assert!(preview.pixels().all(|p| p.0[0] == 0));
}

/// An empty folder fails after the workspace exists
#[test]
fn test_empty_folder_reports_no_images() {
    // Given: a folder with no supported images
    let temp = TempDir::new().unwrap();
    let images = temp.path().join("empty");
    std::fs::create_dir(&images).unwrap();
    std::fs::write(images.join("notes.txt"), b"not an image").unwrap();
    let model = write_model_file(temp.path(), "model.pt");

    // When
    let result = job(
        &images,
        &model,
        Arc::new(FakeModelLoader::new(FakeOutput::Ramp)),
        Arc::new(RecordingSink::new()),
    )
    .run(&CancellationToken::new());

    // Then
    assert!(matches!(result, Err(Error::NoImagesFound(_))));
    let workspace = temp.path().join("empty_ai_workspace");
    assert!(workspace.is_dir());
    assert_eq!(std::fs::read_dir(&workspace).unwrap().count(), 0);
}

/// Cancelling after the second of five images keeps exactly two results
#[test]
fn test_cancel_between_images() {
    // Given: five images; the sink cancels once the second image completes
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 5);
    let model = write_model_file(temp.path(), "model.pt");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let sink = Arc::new(RecordingSink::with_hook(move |event| {
        if let imgto3d_common::ReconEvent::Progress { percent: 40, .. } = event {
            trigger.cancel();
        }
    }));

    // When
    let result = job(
        &images,
        &model,
        Arc::new(FakeModelLoader::new(FakeOutput::Ramp)),
        sink.clone(),
    )
    .run(&cancel);

    // Then: cancelled, two images on disk, the third never started
    assert!(matches!(result, Err(Error::Cancelled)));
    let workspace = temp.path().join("photos_ai_workspace");
    assert_eq!(files_with_suffix(&workspace, ".ply").len(), 2);
    assert_eq!(files_with_suffix(&workspace, "_depth.png").len(), 2);
    assert!(!sink.messages().iter().any(|m| m.starts_with("AI [3/5]")));
}

/// A token cancelled up front stops before any image is processed
#[test]
fn test_cancel_before_start() {
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 2);
    let model = write_model_file(temp.path(), "model.pt");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = job(
        &images,
        &model,
        Arc::new(FakeModelLoader::new(FakeOutput::Ramp)),
        Arc::new(RecordingSink::new()),
    )
    .run(&cancel);

    assert!(matches!(result, Err(Error::Cancelled)));
    let workspace = temp.path().join("photos_ai_workspace");
    assert!(files_with_suffix(&workspace, ".ply").is_empty());
}

/// Undecodable files are skipped and the job still finishes
#[test]
fn test_undecodable_image_skipped() {
    // Given: a valid PNG, a corrupt JPEG and another valid PNG
    let temp = TempDir::new().unwrap();
    let images = temp.path().join("mixed");
    std::fs::create_dir(&images).unwrap();
    write_test_image(&images.join("a.png"), 24, 16);
    write_corrupt_image(&images.join("b.jpg"));
    write_test_image(&images.join("c.png"), 24, 16);
    let model = write_model_file(temp.path(), "model.pt");
    let sink = Arc::new(RecordingSink::new());

    // When
    let (workspace, summary) = job(
        &images,
        &model,
        Arc::new(FakeModelLoader::new(FakeOutput::Ramp)),
        sink.clone(),
    )
    .run_with_summary(&CancellationToken::new())
    .unwrap();

    // Then: two outputs, one skip, progress still reaches 100
    assert_eq!(summary.written, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(files_with_suffix(&workspace, ".ply"), vec!["a.ply", "c.ply"]);
    assert_eq!(sink.percents().last(), Some(&100));
}

/// Inference failures skip the image rather than failing the job
#[test]
fn test_inference_failure_skips_image() {
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 2);
    let model = write_model_file(temp.path(), "model.pt");

    let (workspace, summary) = job(
        &images,
        &model,
        Arc::new(FakeModelLoader::new(FakeOutput::Fail)),
        Arc::new(RecordingSink::new()),
    )
    .run_with_summary(&CancellationToken::new())
    .unwrap();

    assert_eq!(summary.written, 0);
    assert_eq!(summary.skipped, 2);
    assert!(files_with_suffix(&workspace, ".ply").is_empty());
}

/// A missing model file fails before any image is touched
#[test]
fn test_missing_model() {
    // Given: no file at the model path
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 2);
    let loader = Arc::new(FakeModelLoader::new(FakeOutput::Ramp));
    let sink = Arc::new(RecordingSink::new());

    // When
    let result = job(
        &images,
        &temp.path().join("absent.pt"),
        loader.clone(),
        sink.clone(),
    )
    .run(&CancellationToken::new());

    // Then: ModelMissing, loader never called, no per-image events
    assert!(matches!(result, Err(Error::ModelMissing(_))));
    assert_eq!(loader.load_count(), 0);
    assert!(!sink.messages().iter().any(|m| m.starts_with("AI [")));
}

/// A file the runtime rejects is reported as an invalid model
#[test]
fn test_invalid_model() {
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 1);
    let model = write_model_file(temp.path(), "broken.pt");

    let result = job(
        &images,
        &model,
        Arc::new(FakeModelLoader::invalid()),
        Arc::new(RecordingSink::new()),
    )
    .run(&CancellationToken::new());

    assert!(matches!(result, Err(Error::ModelInvalid(_))));
}

/// Writing into the source folder itself is refused
#[test]
fn test_workspace_equal_to_source_rejected() {
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 1);
    let model = write_model_file(temp.path(), "model.pt");

    let result = job(
        &images,
        &model,
        Arc::new(FakeModelLoader::new(FakeOutput::Ramp)),
        Arc::new(RecordingSink::new()),
    )
    .with_workspace(&images)
    .run(&CancellationToken::new());

    assert!(matches!(result, Err(Error::WorkspaceEqualsSource { .. })));
    assert_eq!(files_with_suffix(&images, ".ply").len(), 0);
}

/// A nonexistent images folder is invalid input
#[test]
fn test_missing_images_folder() {
    let temp = TempDir::new().unwrap();
    let model = write_model_file(temp.path(), "model.pt");

    let result = job(
        &temp.path().join("nowhere"),
        &model,
        Arc::new(FakeModelLoader::new(FakeOutput::Ramp)),
        Arc::new(RecordingSink::new()),
    )
    .run(&CancellationToken::new());

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(!temp.path().join("nowhere_ai_workspace").exists());
}
