//! Live progress bars for `mediadl run`.

use std::collections::HashMap;

use anyhow::Result;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use mediadl_core::JobState;
use mediadl_download::{MirrorEntry, MirrorSnapshot};

use super::tables::truncate_string;

const BAR_LENGTH: u64 = 1000;
const MAX_LABEL: usize = 32;

/// One bar per mirrored job, kept in sync with mirror snapshots.
pub struct RunProgress {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    style: ProgressStyle,
}

impl RunProgress {
    pub fn new() -> Result<Self> {
        let style = ProgressStyle::with_template(
            "{prefix:<32} {bar:28.cyan/blue} {percent:>3}% {msg}",
        )?
        .progress_chars("=> ");
        Ok(Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            style,
        })
    }

    /// Update bars from a snapshot; jobs that disappeared lose their bar.
    pub fn render(&mut self, snapshot: &MirrorSnapshot) {
        for (id, entry) in &snapshot.jobs {
            let bar = self.bars.entry(id.clone()).or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(BAR_LENGTH));
                bar.set_style(self.style.clone());
                bar.set_prefix(truncate_string(&label(id, entry), MAX_LABEL));
                bar
            });
            if bar.is_finished() {
                continue;
            }
            bar.set_position(bar_position(entry.percent));
            bar.set_message(status_line(entry));
            if matches!(entry.state, JobState::Completed | JobState::Failed) {
                bar.finish();
            }
        }

        let gone: Vec<String> = self
            .bars
            .keys()
            .filter(|id| !snapshot.jobs.contains_key(*id))
            .cloned()
            .collect();
        for id in gone {
            if let Some(bar) = self.bars.remove(&id) {
                bar.finish_and_clear();
                self.multi.remove(&bar);
            }
        }
    }

    /// Leave every bar as drawn.
    pub fn finish(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

fn label(id: &str, entry: &MirrorEntry) -> String {
    if entry.title.trim().is_empty() {
        id.to_string()
    } else {
        entry.title.clone()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bar_position(percent: f32) -> u64 {
    ((percent.clamp(0.0, 1.0) * BAR_LENGTH as f32).round() as u64).min(BAR_LENGTH)
}

fn status_line(entry: &MirrorEntry) -> String {
    let bytes = HumanBytes(entry.bytes_downloaded);
    match (entry.state, entry.failure_reason) {
        (JobState::Failed, Some(reason)) => format!("failed ({reason})"),
        (JobState::Downloading, _) => format!("{bytes}"),
        (state, _) => format!("{state} {bytes}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediadl_core::FailureReason;

    fn entry(state: JobState, percent: f32) -> MirrorEntry {
        MirrorEntry {
            state,
            percent,
            bytes_downloaded: 2048,
            failure_reason: None,
            title: String::new(),
        }
    }

    #[test]
    fn test_bar_position_is_clamped() {
        assert_eq!(bar_position(0.0), 0);
        assert_eq!(bar_position(0.25), 250);
        assert_eq!(bar_position(1.5), BAR_LENGTH);
        assert_eq!(bar_position(-1.0), 0);
    }

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(&entry(JobState::Downloading, 0.5)), "2.00 KiB");
        assert_eq!(status_line(&entry(JobState::Queued, 0.0)), "queued 2.00 KiB");

        let mut failed = entry(JobState::Failed, 0.1);
        failed.failure_reason = Some(FailureReason::CacheFull);
        assert!(status_line(&failed).starts_with("failed ("));
    }

    #[test]
    fn test_label_prefers_title() {
        let mut e = entry(JobState::Queued, 0.0);
        assert_eq!(label("ep-1", &e), "ep-1");
        e.title = "Sintel".into();
        assert_eq!(label("ep-1", &e), "Sintel");
    }
}
