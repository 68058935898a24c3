//! Holding and releasing downloads on external requirements.

mod common;

use common::{Harness, body};
use mediadl_core::{DownloadRequest, JobState, Requirements, StopReason};

const URI: &str = "https://cdn.example/tears-of-steel.webm";

#[tokio::test]
async fn test_lost_requirements_stop_and_restore_requeues() {
    let h = Harness::new().await;
    h.fetcher.serve(URI, body(100));
    let gate = h.fetcher.gate(URI);
    let engine = h.engine();

    engine
        .add_download(DownloadRequest::new("tos", URI))
        .await
        .unwrap();
    h.wait_for_state("tos", JobState::Downloading).await;

    engine
        .update_met_requirements(Requirements::empty())
        .await
        .unwrap();
    let record = engine.get("tos").await.unwrap();
    assert_eq!(record.state, JobState::Stopped);
    assert_eq!(record.stop_reason, Some(StopReason::RequirementsNotMet));
    assert_eq!(
        engine.snapshot().await.unwrap().not_met_requirements,
        Requirements::NETWORK
    );

    gate.add_permits(100);
    engine
        .update_met_requirements(Requirements::NETWORK_UNMETERED)
        .await
        .unwrap();
    h.wait_for_state("tos", JobState::Completed).await;
}

#[tokio::test]
async fn test_queued_jobs_wait_for_requirements() {
    let h = Harness::new().await;
    h.fetcher.serve(URI, body(30));
    let engine = h.engine();

    engine
        .update_met_requirements(Requirements::DEVICE_CHARGING)
        .await
        .unwrap();
    engine
        .add_download(DownloadRequest::new("tos", URI))
        .await
        .unwrap();
    h.settle().await;
    assert_eq!(engine.query_state("tos").await.unwrap(), JobState::Queued);
    assert!(h.fetcher.requests_for(URI).is_empty());

    engine
        .update_met_requirements(Requirements::NETWORK)
        .await
        .unwrap();
    h.wait_for_state("tos", JobState::Completed).await;
}

#[tokio::test]
async fn test_manual_pause_is_not_resumed_by_requirements() {
    let h = Harness::new().await;
    h.fetcher.serve(URI, body(100));
    h.fetcher.gate(URI);
    let engine = h.engine();

    engine
        .add_download(DownloadRequest::new("tos", URI))
        .await
        .unwrap();
    h.wait_for_state("tos", JobState::Downloading).await;
    engine
        .update_met_requirements(Requirements::empty())
        .await
        .unwrap();

    let paused = engine.pause_download("tos").await.unwrap();
    assert_eq!(paused.stop_reason, Some(StopReason::Manual));

    engine
        .update_met_requirements(Requirements::all())
        .await
        .unwrap();
    h.settle().await;
    let record = engine.get("tos").await.unwrap();
    assert_eq!(record.state, JobState::Stopped);
    assert_eq!(record.stop_reason, Some(StopReason::Manual));

    assert_eq!(engine.resume_all().await.unwrap(), 1);
    let state = engine.query_state("tos").await.unwrap();
    assert!(matches!(state, JobState::Queued | JobState::Downloading));
}
