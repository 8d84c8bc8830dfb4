//! The repository-wide rekey operation.
//!
//! Runs in fixed stages: resolve paths, read the current password, find
//! the vault files, back everything up, then write the new password and
//! re-encrypt file by file. Failures on one file are recorded and the
//! pass moves on; failures that would make every later step meaningless
//! (unreadable password file, failed password backup) abort the run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::file::{BackupError, DecryptError, EncryptError, LoadError, VaultFile};
use super::scan::scan;
use crate::fs::ensure_parent_dir;
use crate::password::{self, DEFAULT_GENERATED_LENGTH, Password, PasswordError};

/// File name tried under the repository root when no password file is
/// given.
pub const DEFAULT_PASSWORD_FILE: &str = "vault-password.txt";

/// Directory created under the repository root for backups when no
/// other location is given.
pub const DEFAULT_BACKUP_DIR: &str = ".rekey-backups";

/// Errors that abort the whole run before or between the per-file
/// stages.
#[derive(Error, Debug)]
pub enum RekeyError {
    #[error("Repository root {path} does not exist or is not a directory")]
    RepositoryNotFound { path: PathBuf },

    #[error("Password file {path} does not exist")]
    PasswordFileNotFound { path: PathBuf },

    #[error("Failed to resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not inside repository root {root}")]
    FileOutsideRepository { path: PathBuf, root: PathBuf },

    #[error(transparent)]
    Password(#[from] PasswordError),

    /// The current password file could not be copied into the backup
    /// tree. That copy is the only way back into files an interrupted
    /// run leaves under the old password, so the run stops before
    /// touching any file.
    #[error("Failed to back up password file {path} to {backup_path}: {source}")]
    PasswordBackup {
        path: PathBuf,
        backup_path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Any of the per-file failure modes, for the report.
#[derive(Error, Debug)]
pub enum VaultFileError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Decrypt(#[from] DecryptError),
    #[error(transparent)]
    Encrypt(#[from] EncryptError),
    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// One file the run gave up on, and why.
#[derive(Debug)]
pub struct FileFailure {
    /// Path relative to the repository root.
    pub path: PathBuf,
    pub error: VaultFileError,
}

/// What a finished run did.
#[derive(Debug)]
pub struct RekeyReport {
    /// Files re-encrypted under the new password, relative to the root.
    /// In a dry run: the files that would have been.
    pub rekeyed: Vec<PathBuf>,
    /// Files skipped over, with the stage that rejected them.
    pub failures: Vec<FileFailure>,
    pub dry_run: bool,
    /// Where backups were written.
    pub backup_root: PathBuf,
    /// True when the backup tree was left on disk.
    pub backups_kept: bool,
    /// The password file the run read and (outside dry runs) rewrote.
    pub password_file: PathBuf,
    /// True when a fresh password was generated and written.
    pub new_password_generated: bool,
}

impl RekeyReport {
    /// True when no file was skipped.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of files the run acted on.
    pub fn processed(&self) -> usize {
        self.rekeyed.len() + self.failures.len()
    }
}

/// Where the new password comes from.
#[derive(Debug)]
pub enum NewPassword {
    /// Generate a fresh random password of this length.
    Generate(usize),
    /// Use a caller-provided password.
    Provided(Password),
}

/// Builder for a rekey run.
///
/// ```no_run
/// use vault_rekey_core::vault::{NewPassword, Rekey};
///
/// let report = Rekey::new("/srv/ansible")
///     .with_new_password(NewPassword::Generate(128))
///     .keep_backups(true)
///     .run()?;
/// # Ok::<(), vault_rekey_core::vault::RekeyError>(())
/// ```
#[derive(Debug)]
pub struct Rekey {
    root: PathBuf,
    password_file: Option<PathBuf>,
    backup_dir: Option<PathBuf>,
    single_file: Option<PathBuf>,
    new_password: NewPassword,
    dry_run: bool,
    keep_backups: bool,
}

impl Rekey {
    /// Rekey the repository rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Rekey {
            root: root.into(),
            password_file: None,
            backup_dir: None,
            single_file: None,
            new_password: NewPassword::Generate(DEFAULT_GENERATED_LENGTH),
            dry_run: false,
            keep_backups: false,
        }
    }

    /// Password file holding the current password. Outside dry runs it
    /// is rewritten with the new one. Defaults to `vault-password.txt`
    /// under the root.
    pub fn with_password_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.password_file = Some(path.into());
        self
    }

    /// Where backups go. Defaults to `.rekey-backups` under the root.
    pub fn with_backup_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(path.into());
        self
    }

    /// Rekey a single file instead of scanning the repository. The file
    /// must live inside the root.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.single_file = Some(path.into());
        self
    }

    /// The new password (defaults to generating a random 128-character
    /// one).
    pub fn with_new_password(mut self, new_password: NewPassword) -> Self {
        self.new_password = new_password;
        self
    }

    /// Decrypt and back up, but write nothing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Leave the backup tree on disk even after a clean run.
    pub fn keep_backups(mut self, keep_backups: bool) -> Self {
        self.keep_backups = keep_backups;
        self
    }

    /// Run the rekey and report what happened.
    ///
    /// Per-file problems land in [`RekeyReport::failures`]; only
    /// repository-level problems return an error. Whenever any file
    /// failed, the backup tree is kept regardless of
    /// [`Rekey::keep_backups`].
    #[instrument(level = "info", name = "rekey", skip(self), fields(root = %self.root.display()))]
    pub fn run(self) -> Result<RekeyReport, RekeyError> {
        let Rekey {
            root,
            password_file,
            backup_dir,
            single_file,
            new_password,
            dry_run,
            keep_backups,
        } = self;

        // Resolve the repository and password file up front.
        if !root.is_dir() {
            return Err(RekeyError::RepositoryNotFound { path: root });
        }
        let root = fs::canonicalize(&root).map_err(|source| RekeyError::Resolve {
            path: root.clone(),
            source,
        })?;
        let password_file = password_file.unwrap_or_else(|| root.join(DEFAULT_PASSWORD_FILE));
        if !password_file.is_file() {
            return Err(RekeyError::PasswordFileNotFound {
                path: password_file,
            });
        }
        let password_file =
            fs::canonicalize(&password_file).map_err(|source| RekeyError::Resolve {
                path: password_file.clone(),
                source,
            })?;
        let backup_root = backup_dir.unwrap_or_else(|| root.join(DEFAULT_BACKUP_DIR));

        let current = Password::from_file(&password_file)?;

        // Find the files to work on.
        let mut failures = Vec::new();
        let targets = match single_file {
            Some(path) => {
                let resolved = fs::canonicalize(&path).map_err(|source| RekeyError::Resolve {
                    path: path.clone(),
                    source,
                })?;
                if !resolved.starts_with(&root) {
                    return Err(RekeyError::FileOutsideRepository {
                        path: resolved,
                        root,
                    });
                }
                match VaultFile::load(&root, &resolved) {
                    Ok(file) if file.has_secrets() => {
                        debug!(%file, "found vault material");
                        vec![file]
                    }
                    Ok(file) => {
                        debug!(path = %file.relative_path().display(), "no vault material, skipping");
                        Vec::new()
                    }
                    Err(error) => {
                        let rel = resolved
                            .strip_prefix(&root)
                            .unwrap_or(&resolved)
                            .to_path_buf();
                        warn!(path = %rel.display(), %error, "skipping file");
                        failures.push(FileFailure {
                            path: rel,
                            error: error.into(),
                        });
                        Vec::new()
                    }
                }
            }
            None => scan(&root, backup_root.file_name()),
        };
        info!(files = targets.len(), "found vault files to rekey");

        // Back up the current password file first. Files the run never
        // reaches stay under the old password, and this copy is what
        // still opens them.
        let password_backup = backup_root.join(
            password_file
                .strip_prefix(&root)
                .ok()
                .or_else(|| password_file.file_name().map(Path::new))
                .unwrap_or(Path::new(DEFAULT_PASSWORD_FILE)),
        );
        let copied = ensure_parent_dir(&password_backup)
            .and_then(|()| fs::copy(&password_file, &password_backup));
        if let Err(source) = copied {
            return Err(RekeyError::PasswordBackup {
                path: password_file,
                backup_path: password_backup,
                source,
            });
        }
        debug!(backup = %password_backup.display(), "backed up password file");

        // Decrypt with the current password and back up every file
        // before anything gets rewritten.
        let mut ready = Vec::new();
        for mut file in targets {
            let rel = file.relative_path().to_path_buf();
            if let Err(error) = file.decrypt(&current) {
                warn!(path = %rel.display(), %error, "skipping file");
                failures.push(FileFailure {
                    path: rel,
                    error: error.into(),
                });
                continue;
            }
            if let Err(error) = file.backup(&backup_root) {
                warn!(path = %rel.display(), %error, "skipping file");
                failures.push(FileFailure {
                    path: rel,
                    error: error.into(),
                });
                continue;
            }
            ready.push(file);
        }

        // Write the new password, then re-encrypt.
        let mut rekeyed = Vec::new();
        let generate = matches!(new_password, NewPassword::Generate(_));
        if dry_run {
            info!("dry run, leaving the repository untouched");
            rekeyed.extend(ready.iter().map(|file| file.relative_path().to_path_buf()));
        } else {
            let new = match new_password {
                NewPassword::Provided(new) => new,
                NewPassword::Generate(length) => {
                    debug!(length, "generated a new vault password");
                    Password::generate(length)
                }
            };
            password::write_password_file(&password_file, &new, true)?;
            info!(path = %password_file.display(), "wrote the new vault password");

            for mut file in ready {
                let rel = file.relative_path().to_path_buf();
                match file.encrypt(&new) {
                    Ok(()) => rekeyed.push(rel),
                    Err(error) => {
                        warn!(path = %rel.display(), %error, "failed to re-encrypt");
                        failures.push(FileFailure {
                            path: rel,
                            error: error.into(),
                        });
                    }
                }
            }
        }

        // Backups stay whenever anything went wrong; a skipped file is
        // exactly the case the backups exist for.
        let retain = keep_backups || !failures.is_empty();
        let mut backups_kept = retain;
        if retain {
            info!(backups = %backup_root.display(), "keeping backups");
        } else {
            match fs::remove_dir_all(&backup_root) {
                Ok(()) => debug!("removed backup directory"),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => {
                    warn!(%error, backups = %backup_root.display(), "failed to remove backup directory");
                    backups_kept = true;
                }
            }
        }

        let report = RekeyReport {
            rekeyed,
            failures,
            dry_run,
            backup_root,
            backups_kept,
            password_file,
            new_password_generated: generate && !dry_run,
        };
        info!(
            rekeyed = report.rekeyed.len(),
            failed = report.failures.len(),
            "rekey complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_repository_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = Rekey::new(dir.path().join("nope")).run().unwrap_err();
        assert!(matches!(err, RekeyError::RepositoryNotFound { .. }));
    }

    #[test]
    fn missing_password_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = Rekey::new(dir.path()).run().unwrap_err();
        assert!(matches!(err, RekeyError::PasswordFileNotFound { .. }));

        let err = Rekey::new(dir.path())
            .with_password_file(dir.path().join("elsewhere.txt"))
            .run()
            .unwrap_err();
        assert!(matches!(err, RekeyError::PasswordFileNotFound { .. }));
    }

    #[test]
    fn file_outside_the_repository_is_fatal() {
        let repo = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        fs::write(repo.path().join(DEFAULT_PASSWORD_FILE), "pw\n").unwrap();
        let stray = other.path().join("vault.yml");
        fs::write(&stray, "a: 1\n").unwrap();

        let err = Rekey::new(repo.path()).with_file(&stray).run().unwrap_err();
        assert!(matches!(err, RekeyError::FileOutsideRepository { .. }));
    }

    #[test]
    fn empty_repository_reports_clean() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join(DEFAULT_PASSWORD_FILE), "pw\n").unwrap();

        let report = Rekey::new(repo.path()).run().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.processed(), 0);
        assert!(!report.backups_kept);
        assert!(!report.backup_root.exists());
    }
}
