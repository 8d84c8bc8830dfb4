//! The `!vault` tagged scalar.
//!
//! Inside a YAML document an encrypted value appears as a block scalar
//! under the `!vault` tag, holding the same envelope text a fully
//! encrypted file would. This module converts between that YAML node
//! shape and an owned [`EncryptedScalar`].

use serde_yaml::Value;
use serde_yaml::value::{Tag, TaggedValue};

use crate::crypto::{self, CipherError};
use crate::password::Password;

/// YAML tag marking an encrypted scalar.
pub const VAULT_TAG: &str = "vault";

/// One encrypted value: the envelope text carried by a `!vault` scalar.
///
/// The ciphertext is stored trimmed. Block scalars pick up a trailing
/// newline from the YAML syntax that is not part of the payload, and the
/// payload grammar itself ignores surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedScalar {
    ciphertext: String,
}

impl EncryptedScalar {
    /// Wrap envelope text, trimming surrounding whitespace.
    ///
    /// No validation happens here; a scalar that is not a well-formed
    /// envelope fails at [`EncryptedScalar::decrypt`].
    pub fn new(ciphertext: impl Into<String>) -> Self {
        let raw = ciphertext.into();
        EncryptedScalar {
            ciphertext: raw.trim().to_owned(),
        }
    }

    /// Encrypt `plaintext` under `password` into a fresh scalar.
    pub fn encrypt(plaintext: &str, password: &Password) -> Result<Self, CipherError> {
        let vaulttext = crypto::encrypt(plaintext.as_bytes(), password)?;
        Ok(EncryptedScalar::new(vaulttext))
    }

    /// Decrypt the scalar, returning the plaintext bytes.
    pub fn decrypt(&self, password: &Password) -> Result<Vec<u8>, CipherError> {
        crypto::decrypt(self.ciphertext.as_bytes(), password)
    }

    /// The envelope text, without surrounding whitespace.
    pub fn ciphertext(&self) -> &str {
        &self.ciphertext
    }

    /// True when `value` is a `!vault` tagged string scalar.
    pub fn is_encrypted(value: &Value) -> bool {
        match value {
            Value::Tagged(tagged) => tagged.tag == VAULT_TAG && tagged.value.is_string(),
            _ => false,
        }
    }

    /// Extract the scalar carried by a `!vault` tagged node.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Tagged(tagged) if tagged.tag == VAULT_TAG => {
                tagged.value.as_str().map(EncryptedScalar::new)
            }
            _ => None,
        }
    }

    /// Wrap the scalar back into a `!vault` tagged YAML node.
    pub fn into_value(self) -> Value {
        Value::Tagged(Box::new(TaggedValue {
            tag: Tag::new(VAULT_TAG),
            value: Value::String(self.ciphertext),
        }))
    }
}
