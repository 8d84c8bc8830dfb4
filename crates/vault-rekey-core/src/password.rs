//! Vault passwords: the secret wrapper, file IO, and generation.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::fs::write_atomic;

/// Alphabet for generated passwords: ASCII letters, digits, and punctuation.
const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789\
      !\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Default length for generated passwords.
pub const DEFAULT_GENERATED_LENGTH: usize = 128;

#[derive(Error, Debug)]
pub enum PasswordError {
    /// Password file could not be read.
    #[error("Failed to read password file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Password file holds nothing but whitespace.
    #[error("Password file {path} is empty")]
    Empty { path: PathBuf },

    /// Target password file already exists and overwriting was not requested.
    #[error("Refusing to overwrite existing password file {path}")]
    AlreadyExists { path: PathBuf },

    /// Password file could not be written.
    #[error("Failed to write password file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A vault password, trimmed of surrounding whitespace on construction.
///
/// Trimming happens exactly once, here, so every layer that derives key
/// material from the password sees the same bytes. The inner secret is
/// redacted from `Debug` output and zeroized on drop.
pub struct Password(SecretString);

impl Password {
    /// Wrap a raw password string.
    pub fn new(raw: &str) -> Self {
        Password(SecretString::from(raw.trim().to_owned()))
    }

    /// Read the password from `path`.
    ///
    /// The trailing newline most editors and `write_password_file` leave
    /// behind is stripped along with any other surrounding whitespace.
    pub fn from_file(path: &Path) -> Result<Self, PasswordError> {
        let raw = Zeroizing::new(fs::read_to_string(path).map_err(|source| PasswordError::Read {
            path: path.to_path_buf(),
            source,
        })?);
        let password = Password::new(&raw);
        if password.expose().is_empty() {
            return Err(PasswordError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(password)
    }

    /// Generate a random password of `length` characters drawn from ASCII
    /// letters, digits, and punctuation.
    pub fn generate(length: usize) -> Self {
        let mut rng = rand::rng();
        let chars: String = (0..length)
            .map(|_| PASSWORD_ALPHABET[rng.random_range(0..PASSWORD_ALPHABET.len())] as char)
            .collect();
        Password(SecretString::from(chars))
    }

    /// Borrow the password text.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.expose().as_bytes()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// Write `password` to `path` with a trailing newline.
///
/// Refuses to clobber an existing file unless `overwrite` is set. The write
/// is atomic, so a crash cannot leave a truncated password file behind.
pub fn write_password_file(
    path: &Path,
    password: &Password,
    overwrite: bool,
) -> Result<(), PasswordError> {
    if path.exists() && !overwrite {
        return Err(PasswordError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    let contents = Zeroizing::new(format!("{}\n", password.expose()));
    write_atomic(path, contents.as_bytes()).map_err(|source| PasswordError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "wrote password file");
    Ok(())
}
