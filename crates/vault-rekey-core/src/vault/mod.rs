//! Vault files and the repository-wide rekey operation.
//!
//! [`VaultFile`] models one file holding encrypted material, whether the
//! whole file is a vault envelope or a YAML document with inline
//! `!vault` scalars. [`scan`] finds them under a repository root,
//! [`Rekey`] drives the decrypt, back up, re-encrypt pass over all of
//! them, and [`restore_backups`] copies a kept backup tree back over
//! the repository.

pub mod file;
pub mod rekey;
pub mod restore;
pub mod scan;

// Re-export commonly used types
pub use file::{BackupError, DecryptError, EncryptError, LoadError, VaultFile};
pub use rekey::{
    DEFAULT_BACKUP_DIR, DEFAULT_PASSWORD_FILE, FileFailure, NewPassword, Rekey, RekeyError,
    RekeyReport, VaultFileError,
};
pub use restore::{RestoreError, restore_backups};
pub use scan::scan;
