//! Working-directory hygiene between tasks.
//!
//! Only regular files count. Directories (mounts, caches) may persist
//! across tasks; files may not.

use std::path::Path;

use crate::error::RunnerError;

/// Fail if `dir` holds any regular file.
pub fn ensure_empty(dir: &Path) -> Result<(), RunnerError> {
    for entry in std::fs::read_dir(dir)? {
        if entry?.file_type()?.is_file() {
            return Err(RunnerError::WorkDirNotEmpty(dir.to_path_buf()));
        }
    }
    Ok(())
}

/// Delete regular files directly inside `dir`. Returns how many were
/// removed. Failures on individual files are logged and skipped.
pub fn clear_files(dir: &Path) -> Result<usize, RunnerError> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove file"),
        }
    }
    Ok(removed)
}
