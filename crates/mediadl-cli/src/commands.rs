//! Subcommands.

use std::path::PathBuf;

use clap::Subcommand;

/// Available commands.
///
/// Commands other than `run` only edit the index; transfers happen while
/// `run` is active.
#[derive(Subcommand)]
pub enum Commands {
    /// Queue a resource for download
    Add {
        /// Stable id for the download
        id: String,
        /// Resource URI
        uri: String,
        /// Display title stored with the download
        #[arg(short, long)]
        title: Option<String>,
        /// Representation variant folded into the cache key (e.g. "720p")
        #[arg(long)]
        variant: Option<String>,
        /// Explicit cache key; downloads sharing a key share cached bytes
        #[arg(long = "cache-key")]
        cache_key: Option<String>,
    },

    /// List all downloads
    List,

    /// Show one download in detail
    Status {
        /// Download id
        id: String,
    },

    /// Pause a download
    Pause {
        /// Download id
        id: String,
    },

    /// Resume a paused download
    Resume {
        /// Download id
        id: String,
    },

    /// Resume every stopped download
    ResumeAll,

    /// Remove a download and its cached bytes
    Remove {
        /// Download id
        id: String,
    },

    /// Remove every download
    RemoveAll {
        /// Skip the summary and remove immediately
        #[arg(short, long)]
        force: bool,
    },

    /// Run queued downloads until none is left (Ctrl-C stops early)
    Run,

    /// Show cache usage
    Cache,

    /// Write a download's bytes to a file, fetching anything not cached
    Export {
        /// Download id
        id: String,
        /// Destination file
        path: PathBuf,
    },
}
