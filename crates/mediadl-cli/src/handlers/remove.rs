//! Remove command handlers.

use anyhow::Result;

use crate::bootstrap::CliContext;

/// Remove one download and its cached bytes.
pub async fn execute(ctx: &CliContext, id: &str) -> Result<()> {
    let before = ctx.engine().cache().total_size();
    ctx.downloads().remove_download(id).await?;
    let freed = before.saturating_sub(ctx.engine().cache().total_size());
    println!("✅ Removed '{id}' ({freed} bytes freed)");
    Ok(())
}

/// Remove every download. Without `force` only reports what would go.
pub async fn remove_all(ctx: &CliContext, force: bool) -> Result<()> {
    let count = ctx.downloads().list().await?.len();
    if count == 0 {
        println!("No downloads.");
        return Ok(());
    }
    if !force {
        println!("This removes {count} download(s) and their cached bytes.");
        println!("Run 'mediadl remove-all --force' to confirm.");
        return Ok(());
    }

    let removed = ctx.downloads().remove_all().await?;
    println!("✅ Removed {removed} download(s)");
    Ok(())
}
