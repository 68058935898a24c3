//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Download media resources for offline use.
#[derive(Parser)]
#[command(name = "mediadl")]
#[command(about = "Queue, run and manage resumable media downloads")]
#[command(version)]
pub struct Cli {
    /// Data directory holding the index database and the cache
    #[arg(long = "data-dir", global = true, env = "MEDIADL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from(["mediadl", "--verbose", "--data-dir", "/tmp/media", "list"]);
        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/media")));
        assert!(matches!(cli.command, Some(Commands::List)));
    }

    #[test]
    fn test_add_arguments() {
        let cli = Cli::parse_from([
            "mediadl",
            "add",
            "ep-1",
            "https://cdn.example/ep1.mp4",
            "--title",
            "Episode 1",
            "--variant",
            "720p",
        ]);
        let Some(Commands::Add {
            id,
            uri,
            title,
            variant,
            cache_key,
        }) = cli.command
        else {
            panic!("expected add");
        };
        assert_eq!(id, "ep-1");
        assert_eq!(uri, "https://cdn.example/ep1.mp4");
        assert_eq!(title.as_deref(), Some("Episode 1"));
        assert_eq!(variant.as_deref(), Some("720p"));
        assert!(cache_key.is_none());
    }
}
