//! Cache command handler.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::presentation::{format_bytes, print_separator, truncate_string};

/// Show per-key cache usage and the budget.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    let cache = ctx.engine().cache();
    let entries = cache.entries();

    println!(
        "Cache: {} used of {} ({})",
        format_bytes(Some(cache.total_size())),
        format_bytes(Some(cache.budget())),
        cache.root().display()
    );
    if entries.is_empty() {
        return Ok(());
    }

    println!();
    println!("{:<50} {:>11} {:>11} {:>6}", "Key", "Cached", "Length", "Spans");
    print_separator(82);
    for entry in &entries {
        println!(
            "{:<50} {:>11} {:>11} {:>6}{}",
            truncate_string(&entry.key, 50),
            format_bytes(Some(entry.cached_bytes)),
            format_bytes(entry.content_length),
            entry.spans,
            if entry.pinned { " (in use)" } else { "" },
        );
    }
    Ok(())
}
