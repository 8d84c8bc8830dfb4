//! Restoring a backup tree into the repository.
//!
//! The rekey pass backs every file up as decrypted content under a
//! mirror of its repository-relative path. [`restore_backups`] is the
//! way back: it copies everything under a kept backup root over the
//! original paths, for recovery after a run that went wrong.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::fs::ensure_parent_dir;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Backup directory {path} does not exist")]
    BackupDirNotFound { path: PathBuf },

    #[error("Failed to walk backup directory {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to restore {path} to {target}: {source}")]
    Io {
        path: PathBuf,
        target: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Copy every file under `backup_root` back to the same relative path
/// under `root`.
///
/// Existing files are overwritten and missing parent directories are
/// created, so restoring a kept backup tree reproduces its content
/// byte for byte at the original paths. Unlike the scan, a failure
/// here aborts the restore: recovery must not silently skip a file.
/// Returns the restored target paths in walk order.
pub fn restore_backups(backup_root: &Path, root: &Path) -> Result<Vec<PathBuf>, RestoreError> {
    if !backup_root.is_dir() {
        return Err(RestoreError::BackupDirNotFound {
            path: backup_root.to_path_buf(),
        });
    }

    let mut restored = Vec::new();
    for entry in WalkDir::new(backup_root)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| RestoreError::Walk {
            path: backup_root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = path.strip_prefix(backup_root).unwrap_or(path);
        let target = root.join(rel);
        ensure_parent_dir(&target)
            .and_then(|()| fs::copy(path, &target).map(|_| ()))
            .map_err(|source| RestoreError::Io {
                path: path.to_path_buf(),
                target: target.clone(),
                source,
            })?;
        debug!(from = %path.display(), to = %target.display(), "restored backup");
        restored.push(target);
    }
    Ok(restored)
}
