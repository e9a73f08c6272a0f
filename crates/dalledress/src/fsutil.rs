//! Filesystem helpers shared across modules.
//!
//! Consistent error context (operation + path) and the atomic write
//! pattern every persisted artifact in this crate relies on: readers of a
//! file written through [`write_atomic`] never observe a torn write.

use std::path::{Path, PathBuf};

use crate::error::{DalleError, Result};

/// Ensure a directory exists, creating it recursively if needed.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| DalleError::cache_io("creating directory", e))
}

/// Ensure the parent directory of a file path exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    ensure_dir(parent)
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so
/// the destination is always either the previous content or the new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    let tmp = temp_sibling(path);
    std::fs::write(&tmp, bytes).map_err(|e| DalleError::cache_io("writing temp file", e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        DalleError::cache_io("renaming temp file", e)
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read a file as a trimmed string, empty when missing.
pub fn read_string_or_empty(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
