//! Pause and resume handlers.

use anyhow::Result;
use mediadl_core::StopReason;

use crate::bootstrap::CliContext;

/// Pause a download, keeping its cached bytes.
pub async fn pause(ctx: &CliContext, id: &str) -> Result<()> {
    let record = ctx.downloads().pause_download(id).await?;
    let cached = ctx.engine().cache().cached_bytes(&record.cache_key);
    match record.stop_reason {
        Some(StopReason::Manual) => println!("Paused '{id}' ({cached} bytes kept)"),
        _ => println!("'{id}' is {}", record.state),
    }
    Ok(())
}

/// Resume a stopped download.
pub async fn resume(ctx: &CliContext, id: &str) -> Result<()> {
    let record = ctx.downloads().resume_download(id).await?;
    println!("'{id}' is {}", record.state);
    Ok(())
}

/// Resume every stopped download.
pub async fn resume_all(ctx: &CliContext) -> Result<()> {
    let resumed = ctx.downloads().resume_all().await?;
    if resumed == 0 {
        println!("Nothing to resume.");
    } else {
        println!("Resumed {resumed} download(s).");
    }
    Ok(())
}
