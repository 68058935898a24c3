//! Recovery from the durable index after a process restart.

mod common;

use common::{Harness, body, key_for};
use mediadl_core::{ByteRange, DownloadError, DownloadRequest, JobEvent, JobState};

const URI: &str = "https://cdn.example/big-buck-bunny.mp4";

#[tokio::test]
async fn test_interrupted_download_is_requeued_and_resumes() {
    let mut h = Harness::new().await;
    h.fetcher.serve(URI, body(100));
    let gate = h.fetcher.gate(URI);

    h.engine()
        .add_download(DownloadRequest::new("bbb", URI).with_data("Big Buck Bunny"))
        .await
        .unwrap();
    gate.add_permits(2);
    h.wait_for_cached(URI, 20).await;

    h.restart(None).await;
    assert_eq!(h.ctx.restored().reset, 1);
    assert_eq!(h.ctx.restored().loaded, 1);

    gate.add_permits(100);
    h.wait_for_state("bbb", JobState::Completed).await;
    assert_eq!(
        h.fetcher.requests_for(URI),
        vec![ByteRange::from(0), ByteRange::bounded(20, 100)]
    );

    h.settle().await;
    let first = &h.events.changes_for("bbb")[0];
    assert!(first.replay);
    assert_eq!(first.state, JobState::Queued);
    assert_eq!(
        h.events.states_for("bbb"),
        vec![JobState::Queued, JobState::Downloading, JobState::Completed]
    );
}

#[tokio::test]
async fn test_terminal_and_stopped_jobs_survive_restart() {
    let mut h = Harness::new().await;
    h.fetcher.serve("https://x/done", body(30));
    h.fetcher.serve("https://x/held", body(30));
    h.fetcher.gate("https://x/held");

    let engine = h.engine();
    engine
        .add_download(DownloadRequest::new("done", "https://x/done"))
        .await
        .unwrap();
    engine
        .add_download(DownloadRequest::new("held", "https://x/held"))
        .await
        .unwrap();
    h.wait_for_state("done", JobState::Completed).await;
    h.wait_for_state("held", JobState::Downloading).await;
    engine.pause_download("held").await.unwrap();

    h.restart(None).await;
    assert_eq!(h.ctx.restored().reset, 0);
    assert_eq!(h.ctx.restored().queued, 0);

    let engine = h.engine();
    assert_eq!(engine.query_state("done").await.unwrap(), JobState::Completed);
    assert_eq!(engine.query_state("held").await.unwrap(), JobState::Stopped);
    assert!(h.ctx.cache().is_fully_cached(&key_for("https://x/done")));

    h.settle().await;
    let replays = h
        .events
        .events()
        .iter()
        .filter(|e| matches!(&e.event, JobEvent::Changed(c) if c.replay))
        .count();
    assert_eq!(replays, 2);
}

#[tokio::test]
async fn test_unfinished_removal_is_completed_on_restart() {
    let mut h = Harness::new().await;
    h.fetcher.serve(URI, body(40));

    h.engine()
        .add_download(DownloadRequest::new("bbb", URI))
        .await
        .unwrap();
    h.wait_for_state("bbb", JobState::Completed).await;

    // A crash between marking and purging leaves the record REMOVING.
    let mut record = h.engine().get("bbb").await.unwrap();
    record.state = JobState::Removing;
    h.stores.index.put(&record).await.unwrap();

    h.restart(None).await;
    assert_eq!(h.ctx.restored().removed, 1);
    assert!(matches!(
        h.engine().get("bbb").await,
        Err(DownloadError::NotFound { .. })
    ));
    assert_eq!(h.ctx.cache().cached_bytes(&key_for(URI)), 0);
}

#[tokio::test]
async fn test_queue_order_is_kept_across_restart() {
    let mut h = Harness::with_config(|c| c.with_max_parallel_downloads(1)).await;
    for uri in ["https://x/1", "https://x/2", "https://x/3"] {
        h.fetcher.serve(uri, body(20));
        h.fetcher.gate(uri);
    }
    let engine = h.engine();
    for (id, uri) in [("1", "https://x/1"), ("2", "https://x/2"), ("3", "https://x/3")] {
        engine
            .add_download(DownloadRequest::new(id, uri))
            .await
            .unwrap();
    }
    h.wait_for_state("1", JobState::Downloading).await;

    h.restart(None).await;
    // "1" was running; it goes behind the jobs that were already waiting.
    h.wait_for_state("2", JobState::Downloading).await;
    assert_eq!(h.ctx.engine().queued_ids().await, vec!["3", "1"]);
    assert_eq!(h.engine().query_state("1").await.unwrap(), JobState::Queued);
}
