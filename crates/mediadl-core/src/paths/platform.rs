//! Platform path resolution.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::PathError;

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "MEDIADL_DATA_DIR";

/// Get the root directory for application data (index database, cache).
///
/// `override_dir` wins over the environment, which wins over the platform
/// default. The directory is created if missing.
pub fn data_root(override_dir: Option<&Path>) -> Result<PathBuf, PathError> {
    let root = match override_dir {
        Some(dir) if dir.as_os_str().is_empty() => return Err(PathError::EmptyPath),
        Some(dir) => dir.to_path_buf(),
        None => match env::var(DATA_DIR_ENV) {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => dirs::data_local_dir()
                .ok_or(PathError::NoDataDir)?
                .join("mediadl"),
        },
    };

    ensure_directory(&root)?;
    Ok(root)
}

/// Path of the index database under `root`.
pub fn database_path(root: &Path) -> Result<PathBuf, PathError> {
    ensure_directory(root)?;
    Ok(root.join("mediadl.db"))
}

/// Directory holding cached spans under `root`, created if missing.
pub fn cache_dir(root: &Path) -> Result<PathBuf, PathError> {
    let dir = root.join("cache");
    ensure_directory(&dir)?;
    Ok(dir)
}

/// Create `path` (and parents) if it does not exist.
pub fn ensure_directory(path: &Path) -> Result<(), PathError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(PathError::NotADirectory(path.to_path_buf()));
        }
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| PathError::CreateFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
