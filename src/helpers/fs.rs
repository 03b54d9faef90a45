//! File System Utilities
//!
//! Configuration and data directory management.

use crate::constants::{APP_NAME, APP_ORGANIZATION, APP_QUALIFIER};
use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME).ok_or(Error::Directory {
        kind: "project",
    })
}

fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(dir.to_path_buf())
}

/// Get or create the application's configuration directory
///
/// Platform-specific locations:
/// - **Linux**: `~/.config/apex-genesis/` or `$XDG_CONFIG_HOME/apex-genesis/`
/// - **macOS**: `~/Library/Application Support/dev.apex.apex-genesis/`
/// - **Windows**: `C:\Users\<User>\AppData\Roaming\apex\apex-genesis\config\`
pub fn get_or_create_config_dir() -> Result<PathBuf> {
    ensure_dir(project_dirs()?.config_dir())
}

/// Get or create the data directory (local storage, logs)
///
/// Platform-specific locations:
/// - **Linux**: `~/.local/share/apex-genesis/`
/// - **macOS**: `~/Library/Application Support/dev.apex.apex-genesis/`
/// - **Windows**: `C:\Users\<User>\AppData\Roaming\apex\apex-genesis\data\`
pub fn get_or_create_data_dir() -> Result<PathBuf> {
    ensure_dir(project_dirs()?.data_dir())
}

/// Check if running in development mode
pub fn is_development() -> bool {
    cfg!(debug_assertions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_dir_creates_nested() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("a").join("b");
        let created = ensure_dir(&target).expect("create");
        assert_eq!(created, target);
        assert!(target.is_dir());

        // Idempotent
        ensure_dir(&target).expect("exists");
    }
}
