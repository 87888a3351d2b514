//! Reconstruction service integration tests
//!
//! Job lifecycle through the public submission API: event ordering, the
//! single-job slot and cancellation by job id.

mod helpers;

use helpers::fake_model::write_model_file;
use helpers::*;
use imgto3d_common::events::BackendKind;
use imgto3d_common::{Error, ReconEvent};
use imgto3d_recon::{ReconConfig, ReconService};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn service(runner: ScriptedStageRunner, sink: &Arc<RecordingSink>) -> ReconService {
    ReconService::new(
        ReconConfig::default(),
        sink.clone(),
        Arc::new(FakeModelLoader::new(FakeOutput::Ramp)),
        Arc::new(runner),
    )
}

/// Wait until the sink has seen a progress message
async fn wait_for_message(sink: &RecordingSink, message: &str) {
    for _ in 0..200 {
        if sink.messages().iter().any(|m| m == message) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("never saw {:?}", message);
}

/// JobStarted, progress, then exactly one terminal event
#[tokio::test]
async fn test_ai_job_event_sequence() {
    // Given
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 2);
    let model = write_model_file(temp.path(), "model.pt");
    let sink = Arc::new(RecordingSink::new());
    let service = service(ScriptedStageRunner::new(), &sink);

    // When
    let handle = service.submit_ai_job(&images, &model).await.unwrap();
    let job_id = handle.job_id();
    let workspace = handle.wait().await.unwrap();

    // Then
    assert_eq!(workspace, temp.path().join("photos_ai_workspace"));
    let events = sink.events();
    assert!(matches!(
        events.first(),
        Some(ReconEvent::JobStarted {
            backend: BackendKind::Ai,
            ..
        })
    ));
    assert!(events.iter().all(|e| e.job_id() == job_id));
    assert_eq!(sink.terminal_events().len(), 1);
    match events.last() {
        Some(ReconEvent::Finished { result_path, .. }) => {
            assert_eq!(result_path, &workspace.display().to_string())
        }
        other => panic!("expected Finished last, got {:?}", other),
    }

    // And: the slot is free again
    assert_eq!(service.active_job().await, None);
}

/// Failures end in one Failed event carrying the error code
#[tokio::test]
async fn test_pipeline_failure_event() {
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 2);
    let sink = Arc::new(RecordingSink::new());
    let service = service(
        ScriptedStageRunner::new().with_exit_codes("mapper", &[1]),
        &sink,
    );

    let handle = service
        .submit_pipeline_job(&images, temp.path().join("out"))
        .await
        .unwrap();
    let result = handle.wait().await;

    assert!(matches!(result, Err(Error::ExternalStageFailed { .. })));
    let terminal = sink.terminal_events();
    assert_eq!(terminal.len(), 1);
    match &terminal[0] {
        ReconEvent::Failed { code, message, .. } => {
            assert_eq!(code, "EXTERNAL_STAGE_FAILED");
            assert!(message.contains("SparseReconstruction"), "{}", message);
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert!(matches!(
        sink.events().first(),
        Some(ReconEvent::JobStarted {
            backend: BackendKind::ExternalPipeline,
            ..
        })
    ));
}

/// A second submission while one job runs is refused; cancel frees the slot
#[tokio::test]
async fn test_single_job_slot_and_cancel() {
    // Given: a pipeline job parked in feature extraction
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 2);
    let model = write_model_file(temp.path(), "model.pt");
    let sink = Arc::new(RecordingSink::new());
    let service = service(
        ScriptedStageRunner::new().blocking_on("feature_extractor"),
        &sink,
    );
    let handle = service
        .submit_pipeline_job(&images, temp.path().join("out"))
        .await
        .unwrap();
    let job_id = handle.job_id();
    wait_for_message(&sink, "Extracting features...").await;

    // When: submitting another job
    let second = service.submit_ai_job(&images, &model).await;

    // Then: refused while the first is active
    assert!(matches!(second, Err(Error::JobAlreadyRunning)));
    assert_eq!(service.active_job().await, Some(job_id));

    // When: cancelling by id
    assert!(service.cancel(job_id).await);
    let result = handle.wait().await;

    // Then: cancelled, single Failed event with CANCELLED, slot released
    assert!(matches!(result, Err(Error::Cancelled)));
    let terminal = sink.terminal_events();
    assert_eq!(terminal.len(), 1);
    assert!(matches!(
        &terminal[0],
        ReconEvent::Failed { code, .. } if code == "CANCELLED"
    ));
    assert_eq!(service.active_job().await, None);
    assert!(!service.cancel(job_id).await);

    // And: a new job is accepted afterwards
    let third = service.submit_ai_job(&images, &model).await.unwrap();
    assert!(third.wait().await.is_ok());
}

/// Cancelling through the handle behaves like cancelling by id
#[tokio::test]
async fn test_handle_cancel() {
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 2);
    let sink = Arc::new(RecordingSink::new());
    let service = service(ScriptedStageRunner::new().blocking_on("mapper"), &sink);

    let handle = service
        .submit_pipeline_job(&images, temp.path().join("out"))
        .await
        .unwrap();
    wait_for_message(&sink, "Sparse reconstruction...").await;
    handle.cancel();

    assert!(matches!(handle.wait().await, Err(Error::Cancelled)));
    assert_eq!(service.active_job().await, None);
}

/// Dense jobs use the existing workspace and the dense-only stages
#[tokio::test]
async fn test_dense_job() {
    let temp = TempDir::new().unwrap();
    let images = create_image_folder(temp.path(), "photos", 2);
    let workspace = temp.path().join("ws");
    std::fs::create_dir_all(workspace.join("sparse").join("0")).unwrap();
    let sink = Arc::new(RecordingSink::new());
    let service = service(ScriptedStageRunner::new(), &sink);

    let handle = service.submit_dense_job(&images, &workspace).await.unwrap();
    let result = handle.wait().await.unwrap();

    assert_eq!(result, workspace.join("dense").join("fused.ply"));
}
