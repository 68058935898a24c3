//! Path utilities for mediadl data directories.
//!
//! Resolution order for the data root:
//! 1. Explicit override (e.g. a `--data-dir` flag)
//! 2. `MEDIADL_DATA_DIR` environment variable
//! 3. System data directory (e.g. `~/.local/share/mediadl`)

mod error;
mod platform;

pub use error::PathError;
pub use platform::{DATA_DIR_ENV, cache_dir, data_root, database_path, ensure_directory};
