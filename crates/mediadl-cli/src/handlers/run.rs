//! Run command handler: drives the scheduler in the foreground.

use std::time::Duration;

use anyhow::Result;
use mediadl_core::JobState;
use tokio::signal;

use crate::bootstrap::CliContext;
use crate::presentation::RunProgress;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Start transfers and render progress until nothing is QUEUED or
/// DOWNLOADING, or until Ctrl-C.
///
/// Interrupted jobs stay in the index and continue on the next run.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let downloads = ctx.downloads();
    let initial = downloads.snapshot().await?;
    if !initial.is_busy() {
        println!("Nothing to download.");
        return Ok(());
    }
    if !initial.not_met_requirements.is_empty() {
        println!(
            "Waiting for: {}",
            initial.not_met_requirements.describe().join(", ")
        );
    }

    let mut snapshots = ctx.engine().mirror().subscribe();
    let mut progress = RunProgress::new()?;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut ctrl_c = Box::pin(signal::ctrl_c());
    ctx.engine().start();
    tracing::info!(
        queued = initial.queued_count,
        parallel = ctx.config.max_parallel_downloads,
        "Running downloads"
    );

    let interrupted = loop {
        tokio::select! {
            biased;
            result = &mut ctrl_c => {
                result?;
                break true;
            }
            _ = snapshots.changed() => {}
            _ = ticker.tick() => {}
        }
        progress.render(&snapshots.borrow_and_update());
        if !downloads.snapshot().await?.is_busy() {
            break false;
        }
    };
    progress.render(&ctx.engine().mirror().snapshot());
    progress.finish();

    if interrupted {
        println!("Stopped. Unfinished downloads continue on the next 'mediadl run'.");
        return Ok(());
    }

    let summary = downloads.snapshot().await?;
    let failed = summary
        .items
        .iter()
        .filter(|item| item.state == JobState::Failed)
        .count();
    println!(
        "Done: {} download(s), {failed} failed.",
        summary.items.len()
    );
    Ok(())
}
