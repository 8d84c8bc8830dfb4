//! Rekey Ansible Vault secrets across a repository.
//!
//! Walks a repository root, finds every file holding vault-encrypted
//! material (whole-file `$ANSIBLE_VAULT;1.1;AES256` envelopes and YAML
//! documents with inline `!vault` scalars), decrypts it with the
//! current password and re-encrypts it with a new one. Every touched
//! file is backed up first, and a file that fails at any stage is
//! skipped without stopping the rest of the pass.
//!
//! The entry point is the [`vault::Rekey`] builder:
//!
//! ```no_run
//! use vault_rekey_core::vault::{NewPassword, Rekey};
//!
//! let report = Rekey::new("/srv/ansible")
//!     .with_new_password(NewPassword::Generate(128))
//!     .dry_run(true)
//!     .run()?;
//! for path in &report.rekeyed {
//!     println!("would rekey {}", path.display());
//! }
//! # Ok::<(), vault_rekey_core::vault::RekeyError>(())
//! ```

pub mod crypto;
pub mod document;
mod fs;
pub mod password;
pub mod vault;

// Re-export commonly used types
pub use crypto::CipherError;
pub use document::{EncryptedScalar, SecretAddress};
pub use password::{Password, PasswordError};
pub use vault::{NewPassword, Rekey, RekeyError, RekeyReport, VaultFile};
