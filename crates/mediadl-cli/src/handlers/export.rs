//! Export command handler.

use std::path::Path;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use indicatif::HumanBytes;
use mediadl_core::ByteRange;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Stream a download's resource into `path`.
///
/// Cached ranges are read locally; missing ranges are fetched and cached
/// on the way through.
pub async fn execute(ctx: &CliContext, id: &str, path: &Path) -> Result<()> {
    let mut stream = ctx
        .engine()
        .read_resource(id, ByteRange::from(0))
        .await?;
    let mut file = File::create(path)
        .await
        .map_err(CliError::from)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(CliError::from)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(CliError::from)?;

    println!("✅ Wrote {} to {}", HumanBytes(written), path.display());
    Ok(())
}
