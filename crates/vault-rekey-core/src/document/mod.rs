//! YAML documents and the encrypted scalars inside them.

pub mod locator;
pub mod scalar;

pub(crate) use locator::count_all_secrets;

// Re-export commonly used types
pub use locator::{SecretAddress, SecretIter, Step, find_secrets};
pub use scalar::{EncryptedScalar, VAULT_TAG};
