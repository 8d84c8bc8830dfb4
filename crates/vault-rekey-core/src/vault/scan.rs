//! Repository scanning for vault files.

use std::ffi::OsStr;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::file::VaultFile;

/// Directory names never descended into.
const EXCLUDED_DIRS: &[&str] = &[".git", ".rekey-backups"];

/// Walk `root` and load every YAML file that holds vault material.
///
/// Candidates are files ending in `.yml` or `.yaml`; whether one is a
/// whole-file envelope or a YAML document with embedded secrets is
/// settled by [`VaultFile::load`], and only files with something to
/// rekey are returned. Files that fail to load are logged and skipped
/// so one broken file cannot stop a repository-wide pass.
/// `extra_excluded_dir` prunes a configured backup directory that lives
/// inside the root.
pub fn scan(root: &Path, extra_excluded_dir: Option<&OsStr>) -> Vec<VaultFile> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() > 0 && entry.file_type().is_dir() {
                let name = entry.file_name();
                if EXCLUDED_DIRS.iter().any(|dir| name == OsStr::new(dir)) {
                    return false;
                }
                if extra_excluded_dir.is_some_and(|dir| name == dir) {
                    return false;
                }
                // Template directories are pruned wholesale, matching
                // the file-level `.j2` rule.
                if name.to_str().is_some_and(|name| name.contains(".j2")) {
                    return false;
                }
            }
            true
        });

    let mut found = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(%error, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !has_yaml_extension(path) {
            continue;
        }
        if is_template(path) {
            debug!(path = %path.display(), "skipping template file");
            continue;
        }
        match VaultFile::load(root, path) {
            Ok(file) if file.has_secrets() => {
                debug!(%file, "found vault material");
                found.push(file);
            }
            Ok(file) => {
                debug!(path = %file.relative_path().display(), "no vault material, skipping");
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping file that did not load");
            }
        }
    }
    found
}

fn has_yaml_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(OsStr::to_str),
        Some("yml" | "yaml")
    )
}

/// Jinja-templated YAML is not parseable and never holds literal vault
/// payloads, so anything with `.j2` in the name is skipped outright.
fn is_template(path: &Path) -> bool {
    path.file_name()
        .and_then(OsStr::to_str)
        .is_some_and(|name| name.contains(".j2"))
}
