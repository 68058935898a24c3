//! Add command handler.

use anyhow::Result;
use mediadl_core::{DownloadRequest, JobState};

use crate::bootstrap::CliContext;

/// Arguments for `mediadl add`.
pub struct AddArgs {
    pub id: String,
    pub uri: String,
    pub title: Option<String>,
    pub variant: Option<String>,
    pub cache_key: Option<String>,
}

impl AddArgs {
    fn into_request(self) -> DownloadRequest {
        let mut request = DownloadRequest::new(self.id, self.uri);
        if let Some(title) = self.title {
            request = request.with_data(title);
        }
        if let Some(variant) = self.variant {
            request = request.with_variant(variant);
        }
        if let Some(key) = self.cache_key {
            request = request.with_cache_key(key);
        }
        request
    }
}

/// Queue a download. Re-adding a known id reports the existing download.
pub async fn execute(ctx: &CliContext, args: AddArgs) -> Result<()> {
    let request = args.into_request();
    let requested_uri = request.resource_uri.clone();
    let record = ctx.downloads().add_download(request).await?;

    if record.state == JobState::Queued && record.resource_uri == requested_uri {
        println!("Queued '{}' ({})", record.id, record.resource_uri);
        println!("Use 'mediadl run' to start downloading.");
    } else {
        println!(
            "'{}' already exists ({}, {})",
            record.id, record.state, record.resource_uri
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_options() {
        let request = AddArgs {
            id: "ep-1".into(),
            uri: "https://cdn.example/ep1.mp4".into(),
            title: Some("Episode 1".into()),
            variant: Some("720p".into()),
            cache_key: None,
        }
        .into_request();
        assert_eq!(request.opaque_data, b"Episode 1");
        assert_eq!(request.cache_key().as_str(), "https://cdn.example/ep1.mp4#720p");
    }
}
