//! List command handler.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::presentation::{format_bytes, format_percent, print_separator, truncate_string};

/// Print every download as a table, followed by queue totals.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let snapshot = ctx.downloads().snapshot().await?;

    if snapshot.items.is_empty() {
        println!("No downloads.");
        println!("Use 'mediadl add <id> <uri>' to queue one.");
        return Ok(());
    }

    println!(
        "{:<20} {:<12} {:>8} {:>11} {:>11}  Title",
        "ID", "State", "Progress", "Downloaded", "Size"
    );
    print_separator(90);
    for item in &snapshot.items {
        println!(
            "{:<20} {:<12} {:>8} {:>11} {:>11}  {}",
            truncate_string(&item.id, 20),
            item.state.to_string(),
            format_percent(item.percent),
            format_bytes(Some(item.bytes_downloaded)),
            format_bytes(item.content_length),
            truncate_string(&item.title, 30),
        );
    }
    print_separator(90);

    println!(
        "{} downloading, {} queued, overall {}",
        snapshot.downloading_count,
        snapshot.queued_count,
        format_percent(snapshot.aggregate_percent)
    );
    if !snapshot.not_met_requirements.is_empty() {
        println!(
            "Waiting for: {}",
            snapshot.not_met_requirements.describe().join(", ")
        );
    }
    Ok(())
}
