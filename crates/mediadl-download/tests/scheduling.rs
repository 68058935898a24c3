//! Concurrency bound and FIFO start order.

mod common;

use common::{Harness, body};
use mediadl_core::{DownloadRequest, JobEvent, JobState};

#[tokio::test]
async fn test_parallel_bound_and_fifo_order() {
    let h = Harness::with_config(|c| c.with_max_parallel_downloads(2)).await;
    let ids = ["a", "b", "c", "d"];
    let mut gates = Vec::new();
    for id in ids {
        let uri = format!("https://x/{id}");
        h.fetcher.serve(&uri, body(20));
        gates.push(h.fetcher.gate(&uri));
        h.engine()
            .add_download(DownloadRequest::new(id, uri))
            .await
            .unwrap();
    }

    h.wait_for_state("a", JobState::Downloading).await;
    h.wait_for_state("b", JobState::Downloading).await;
    h.settle().await;
    assert_eq!(h.ctx.engine().active_count().await, 2);
    assert_eq!(h.ctx.engine().queued_ids().await, vec!["c", "d"]);

    gates[0].add_permits(10);
    h.wait_for_state("a", JobState::Completed).await;
    h.wait_for_state("c", JobState::Downloading).await;
    assert_eq!(h.engine().query_state("d").await.unwrap(), JobState::Queued);

    for gate in &gates {
        gate.add_permits(10);
    }
    for id in ids {
        h.wait_for_state(id, JobState::Completed).await;
    }

    h.settle().await;
    let started: Vec<String> = h
        .events
        .events()
        .into_iter()
        .filter_map(|e| match e.event {
            JobEvent::Changed(c)
                if c.state == JobState::Downloading
                    && c.previous_state == Some(JobState::Queued) =>
            {
                Some(c.id)
            }
            _ => None,
        })
        .collect();
    assert_eq!(started, ids);
}

#[tokio::test]
async fn test_bus_sequence_is_strictly_increasing() {
    let h = Harness::new().await;
    h.fetcher.serve("https://x/a", body(50));
    h.engine()
        .add_download(DownloadRequest::new("a", "https://x/a"))
        .await
        .unwrap();
    h.wait_for_state("a", JobState::Completed).await;
    h.settle().await;

    let seqs: Vec<u64> = h.events.events().iter().map(|e| e.seq).collect();
    assert!(!seqs.is_empty());
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
}
