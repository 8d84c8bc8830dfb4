//! One file holding vault-encrypted material.
//!
//! Two shapes exist in the wild: files that are a single envelope from
//! the first byte (the classic `vault.yml`), and ordinary YAML files
//! with `!vault` scalars scattered through them. [`VaultFile`] loads
//! either, decrypts everything it holds into memory, and re-encrypts it
//! back to disk under a new password.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::crypto::{self, CipherError, envelope};
use crate::document::{self, EncryptedScalar, SecretAddress, find_secrets};
use crate::fs::{ensure_parent_dir, write_atomic};
use crate::password::Password;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document holds an encrypted scalar the locator cannot address,
    /// for example behind a non-string mapping key or a foreign tag.
    /// Rekeying such a file would silently leave that scalar on the old
    /// password, so the whole file is refused instead.
    #[error("{path} holds an encrypted value at an unaddressable position")]
    UnaddressableSecret { path: PathBuf },

    #[error("{path} is not inside the repository root")]
    OutsideRoot { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum DecryptError {
    /// The whole-file payload would not decrypt.
    #[error("Failed to decrypt {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: CipherError,
    },

    /// One embedded scalar would not decrypt.
    #[error("Failed to decrypt {address} in {path}: {source}")]
    Scalar {
        path: PathBuf,
        address: SecretAddress,
        #[source]
        source: CipherError,
    },

    /// An embedded scalar decrypted to bytes that are not UTF-8, so it
    /// cannot be put back into a YAML document.
    #[error("Decrypted value at {address} in {path} is not UTF-8 text")]
    NotText { path: PathBuf, address: SecretAddress },
}

#[derive(Error, Debug)]
pub enum EncryptError {
    /// `encrypt` was called before a successful `decrypt`.
    #[error("{path} has no decrypted material to re-encrypt")]
    NotDecrypted { path: PathBuf },

    #[error("Failed to encrypt {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: CipherError,
    },

    #[error("Failed to encrypt {address} in {path}: {source}")]
    Scalar {
        path: PathBuf,
        address: SecretAddress,
        #[source]
        source: CipherError,
    },

    /// A recorded address stopped resolving while rebuilding the
    /// document. Guards an invariant rather than a reachable state: the
    /// document is not mutated between load and encrypt.
    #[error("Secret at {address} vanished from {path}")]
    ShapeChanged { path: PathBuf, address: SecretAddress },

    #[error("Failed to serialize YAML for {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum BackupError {
    /// `backup` was called before a successful `decrypt`; there is no
    /// content to write.
    #[error("{path} has no decrypted content to back up")]
    NothingToBackup { path: PathBuf },

    /// A recorded address stopped resolving while materializing the
    /// decrypted document. Guards an invariant rather than a reachable
    /// state: the document is not mutated after load.
    #[error("Secret at {address} vanished from {path}")]
    ShapeChanged { path: PathBuf, address: SecretAddress },

    #[error("Failed to serialize YAML for {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to back up {path} to {backup_path}: {source}")]
    Io {
        path: PathBuf,
        backup_path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The two shapes of encrypted material a file can carry.
enum VaultKind {
    /// The entire file is one envelope.
    Full {
        vaulttext: Vec<u8>,
        plaintext: Option<Zeroizing<Vec<u8>>>,
    },
    /// A YAML document with embedded `!vault` scalars.
    Partial {
        document: Value,
        secrets: Vec<(SecretAddress, EncryptedScalar)>,
        plaintexts: Option<Vec<(SecretAddress, Zeroizing<String>)>>,
    },
}

/// A file containing vault-encrypted material, loaded into memory.
///
/// Construction classifies the file, decryption caches plaintext without
/// touching disk, and encryption rewrites the file in one atomic step.
/// The borderline cases (no secrets at all, secrets the locator cannot
/// address) are settled at load time so the later stages cannot trip
/// over them.
pub struct VaultFile {
    path: PathBuf,
    rel_path: PathBuf,
    kind: VaultKind,
}

impl VaultFile {
    /// Load and classify the file at `path`.
    ///
    /// `root` anchors the relative path used for backups and reporting.
    /// A file is fully encrypted when it opens with the envelope
    /// signature; anything else must parse as a single YAML document.
    pub fn load(root: &Path, path: &Path) -> Result<Self, LoadError> {
        let rel_path = path
            .strip_prefix(root)
            .map_err(|_| LoadError::OutsideRoot {
                path: path.to_path_buf(),
            })?
            .to_path_buf();
        let bytes = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let kind = if envelope::is_vault_data(&bytes) {
            VaultKind::Full {
                vaulttext: bytes,
                plaintext: None,
            }
        } else {
            let document: Value =
                serde_yaml::from_slice(&bytes).map_err(|source| LoadError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?;
            let addresses: Vec<SecretAddress> = find_secrets(&document).collect();
            if addresses.len() != document::count_all_secrets(&document) {
                return Err(LoadError::UnaddressableSecret {
                    path: path.to_path_buf(),
                });
            }
            let mut secrets = Vec::with_capacity(addresses.len());
            for address in addresses {
                let Some(scalar) = address
                    .resolve(&document)
                    .and_then(EncryptedScalar::from_value)
                else {
                    return Err(LoadError::UnaddressableSecret {
                        path: path.to_path_buf(),
                    });
                };
                secrets.push((address, scalar));
            }
            VaultKind::Partial {
                document,
                secrets,
                plaintexts: None,
            }
        };

        Ok(VaultFile {
            path: path.to_path_buf(),
            rel_path,
            kind,
        })
    }

    /// Absolute path of the file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the repository root.
    pub fn relative_path(&self) -> &Path {
        &self.rel_path
    }

    /// True when the whole file is a single envelope.
    pub fn is_fully_encrypted(&self) -> bool {
        matches!(self.kind, VaultKind::Full { .. })
    }

    /// Number of encrypted payloads in the file. A fully encrypted file
    /// counts as one.
    pub fn secret_count(&self) -> usize {
        match &self.kind {
            VaultKind::Full { .. } => 1,
            VaultKind::Partial { secrets, .. } => secrets.len(),
        }
    }

    /// True when there is anything here to rekey.
    pub fn has_secrets(&self) -> bool {
        self.secret_count() > 0
    }

    /// Decrypt every payload in the file with `password`.
    ///
    /// Nothing is written back; plaintext is cached in memory for a later
    /// [`VaultFile::encrypt`]. Either every payload decrypts or the call
    /// fails and the cache stays empty, so a half-decrypted file cannot
    /// be observed.
    #[instrument(level = "debug", skip(self, password), fields(path = %self.rel_path.display()))]
    pub fn decrypt(&mut self, password: &Password) -> Result<(), DecryptError> {
        match &mut self.kind {
            VaultKind::Full {
                vaulttext,
                plaintext,
            } => {
                let decrypted =
                    crypto::decrypt(vaulttext, password).map_err(|source| DecryptError::File {
                        path: self.path.clone(),
                        source,
                    })?;
                *plaintext = Some(Zeroizing::new(decrypted));
            }
            VaultKind::Partial {
                secrets,
                plaintexts,
                ..
            } => {
                let mut decrypted = Vec::with_capacity(secrets.len());
                for (address, scalar) in secrets.iter() {
                    let bytes =
                        scalar
                            .decrypt(password)
                            .map_err(|source| DecryptError::Scalar {
                                path: self.path.clone(),
                                address: address.clone(),
                                source,
                            })?;
                    let text = String::from_utf8(bytes).map_err(|_| DecryptError::NotText {
                        path: self.path.clone(),
                        address: address.clone(),
                    })?;
                    decrypted.push((address.clone(), Zeroizing::new(text)));
                }
                *plaintexts = Some(decrypted);
            }
        }
        debug!(secrets = self.secret_count(), "decrypted vault material");
        Ok(())
    }

    /// True once `decrypt` has succeeded.
    pub fn is_decrypted(&self) -> bool {
        match &self.kind {
            VaultKind::Full { plaintext, .. } => plaintext.is_some(),
            VaultKind::Partial { plaintexts, .. } => plaintexts.is_some(),
        }
    }

    /// Re-encrypt every payload with `new_password` and rewrite the file.
    ///
    /// [`VaultFile::decrypt`] must have succeeded first. The rewrite goes
    /// through a temporary file and rename, so the on-disk file is never
    /// left half written. For partial files, only the `!vault` nodes
    /// change; the rest of the document structure is re-emitted as
    /// parsed.
    #[instrument(level = "debug", skip(self, new_password), fields(path = %self.rel_path.display()))]
    pub fn encrypt(&mut self, new_password: &Password) -> Result<(), EncryptError> {
        let contents = self.render(new_password)?;
        write_atomic(&self.path, &contents).map_err(|source| EncryptError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(bytes = contents.len(), "re-encrypted vault file");
        Ok(())
    }

    fn render(&self, new_password: &Password) -> Result<Vec<u8>, EncryptError> {
        match &self.kind {
            VaultKind::Full { plaintext, .. } => {
                let plaintext = plaintext.as_ref().ok_or_else(|| EncryptError::NotDecrypted {
                    path: self.path.clone(),
                })?;
                let vaulttext = crypto::encrypt(plaintext, new_password).map_err(|source| {
                    EncryptError::File {
                        path: self.path.clone(),
                        source,
                    }
                })?;
                Ok(vaulttext.into_bytes())
            }
            VaultKind::Partial {
                document,
                plaintexts,
                ..
            } => {
                let plaintexts =
                    plaintexts
                        .as_ref()
                        .ok_or_else(|| EncryptError::NotDecrypted {
                            path: self.path.clone(),
                        })?;
                let mut rewritten = document.clone();
                for (address, plain) in plaintexts {
                    let scalar =
                        EncryptedScalar::encrypt(plain, new_password).map_err(|source| {
                            EncryptError::Scalar {
                                path: self.path.clone(),
                                address: address.clone(),
                                source,
                            }
                        })?;
                    if !address.replace(&mut rewritten, scalar.into_value()) {
                        return Err(EncryptError::ShapeChanged {
                            path: self.path.clone(),
                            address: address.clone(),
                        });
                    }
                }
                let text =
                    serde_yaml::to_string(&rewritten).map_err(|source| EncryptError::Yaml {
                        path: self.path.clone(),
                        source,
                    })?;
                Ok(text.into_bytes())
            }
        }
    }

    /// Write the decrypted content into `backup_root`, mirroring the
    /// repository-relative path of the file.
    ///
    /// Requires a prior [`VaultFile::decrypt`]. The backup holds
    /// plaintext: the decrypted bytes of a fully encrypted file, or the
    /// document with every secret in the clear for a partial one. It goes
    /// through a temporary file and rename, so a failed backup never
    /// leaves a half-written copy behind.
    pub fn backup(&self, backup_root: &Path) -> Result<PathBuf, BackupError> {
        let content: Zeroizing<Vec<u8>> = match &self.kind {
            VaultKind::Full { plaintext, .. } => match plaintext {
                Some(plaintext) => Zeroizing::new(plaintext.to_vec()),
                None => {
                    return Err(BackupError::NothingToBackup {
                        path: self.path.clone(),
                    });
                }
            },
            VaultKind::Partial {
                document,
                plaintexts,
                ..
            } => {
                let Some(plaintexts) = plaintexts else {
                    return Err(BackupError::NothingToBackup {
                        path: self.path.clone(),
                    });
                };
                let mut decrypted = document.clone();
                for (address, plain) in plaintexts {
                    let substituted =
                        address.replace(&mut decrypted, Value::String(plain.as_str().to_owned()));
                    if !substituted {
                        return Err(BackupError::ShapeChanged {
                            path: self.path.clone(),
                            address: address.clone(),
                        });
                    }
                }
                let text =
                    serde_yaml::to_string(&decrypted).map_err(|source| BackupError::Yaml {
                        path: self.path.clone(),
                        source,
                    })?;
                Zeroizing::new(text.into_bytes())
            }
        };

        let backup_path = backup_root.join(&self.rel_path);
        let written =
            ensure_parent_dir(&backup_path).and_then(|()| write_atomic(&backup_path, &content));
        if let Err(source) = written {
            return Err(BackupError::Io {
                path: self.path.clone(),
                backup_path,
                source,
            });
        }
        debug!(backup = %backup_path.display(), "backed up decrypted content");
        Ok(backup_path)
    }
}

impl fmt::Display for VaultFile {
    /// Renders like `group_vars/vault.yml (fully encrypted)` or
    /// `host_vars/web.yml (2 inline secrets)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            VaultKind::Full { .. } => {
                write!(f, "{} (fully encrypted)", self.rel_path.display())
            }
            VaultKind::Partial { secrets, .. } => {
                let noun = if secrets.len() == 1 {
                    "inline secret"
                } else {
                    "inline secrets"
                };
                write!(f, "{} ({} {noun})", self.rel_path.display(), secrets.len())
            }
        }
    }
}
