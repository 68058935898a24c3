//! Status command handler.

use anyhow::Result;
use mediadl_core::JobRecord;

use crate::bootstrap::CliContext;
use crate::presentation::{format_bytes, format_percent};

/// Show one download in detail.
pub async fn execute(ctx: &CliContext, id: &str) -> Result<()> {
    let record = ctx.downloads().get(id).await?;
    let cached = ctx.engine().cache().cached_bytes(&record.cache_key);
    for line in describe(&record, cached) {
        println!("{line}");
    }
    Ok(())
}

fn describe(record: &JobRecord, cached: u64) -> Vec<String> {
    let mut lines = vec![
        format!("ID:          {}", record.id),
        format!("URI:         {}", record.resource_uri),
        format!("State:       {}", record.state),
        format!("Progress:    {}", format_percent(record.percent)),
        format!(
            "Downloaded:  {} of {}",
            format_bytes(Some(record.bytes_downloaded)),
            format_bytes(record.content_length)
        ),
        format!("Cached:      {}", format_bytes(Some(cached))),
        format!("Cache key:   {}", record.cache_key),
    ];
    let title = record.opaque_text();
    if !title.is_empty() {
        lines.insert(1, format!("Title:       {title}"));
    }
    if let Some(reason) = record.stop_reason {
        lines.push(format!("Stopped:     {}", reason.as_str()));
    }
    if let Some(reason) = record.failure_reason {
        let message = record.failure_message.as_deref().unwrap_or("");
        lines.push(format!("Failed:      {reason} {message}").trim_end().to_string());
    }
    if record.retry_count > 0 {
        lines.push(format!("Retries:     {}", record.retry_count));
    }
    lines.push(format!(
        "Updated:     {}",
        record.updated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediadl_core::{CacheKey, FailureReason, JobState};

    #[test]
    fn test_describe_failed_job() {
        let mut record = JobRecord::new(
            "ep-1",
            "https://cdn.example/ep1.mp4",
            CacheKey::new("https://cdn.example/ep1.mp4"),
            b"Episode 1".to_vec(),
            0,
        );
        record.state = JobState::Failed;
        record.failure_reason = Some(FailureReason::CacheFull);
        record.failure_message = Some("need 10 bytes".into());

        let lines = describe(&record, 0);
        assert_eq!(lines[1], "Title:       Episode 1");
        assert!(lines.iter().any(|l| l == "State:       failed"));
        assert!(lines.iter().any(|l| l == "Failed:      cache_full need 10 bytes"));
        assert!(!lines.iter().any(|l| l.starts_with("Stopped:")));
    }
}
