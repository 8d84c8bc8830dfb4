//! Test harness building throwaway Ansible-style repositories.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use vault_rekey_core::crypto;
use vault_rekey_core::password::Password;

/// Password every fixture secret is encrypted under.
pub const CURRENT_PASSWORD: &str = "old-vault-password";

/// A throwaway repository seeded with a password file, ready to have
/// vault material written into it.
pub struct TestRepo {
    _temp_dir: TempDir,
    /// Canonicalized repository root.
    pub root: PathBuf,
}

impl TestRepo {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        // Canonicalized up front so path assertions line up with the
        // canonicalized paths in rekey reports.
        let root = temp_dir
            .path()
            .canonicalize()
            .expect("canonicalize temp dir");
        fs::write(
            root.join("vault-password.txt"),
            format!("{CURRENT_PASSWORD}\n"),
        )
        .expect("write password file");
        TestRepo {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Absolute path of `rel` inside the repository.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn current_password(&self) -> Password {
        Password::new(CURRENT_PASSWORD)
    }

    /// Write a file under the root, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directories");
        }
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Write a fully encrypted vault file holding `plaintext`.
    pub fn write_full_vault(&self, rel: &str, plaintext: &str) -> PathBuf {
        let vaulttext = crypto::encrypt(plaintext.as_bytes(), &self.current_password())
            .expect("encrypt fixture");
        self.write(rel, &vaulttext)
    }

    /// Render an inline `!vault` block scalar for hand-written YAML,
    /// with the payload lines indented by `indent` spaces.
    pub fn vault_scalar(&self, plaintext: &str, indent: usize) -> String {
        self.vault_scalar_under(plaintext, CURRENT_PASSWORD, indent)
    }

    /// Same as [`TestRepo::vault_scalar`], but encrypted under an
    /// arbitrary password.
    pub fn vault_scalar_under(&self, plaintext: &str, password: &str, indent: usize) -> String {
        let vaulttext = crypto::encrypt(plaintext.as_bytes(), &Password::new(password))
            .expect("encrypt fixture");
        let pad = " ".repeat(indent);
        let mut block = String::from("!vault |");
        for line in vaulttext.lines() {
            block.push('\n');
            block.push_str(&pad);
            block.push_str(line);
        }
        block
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).expect("read fixture file")
    }

    pub fn read_bytes(&self, rel: &str) -> Vec<u8> {
        fs::read(self.root.join(rel)).expect("read fixture file")
    }

    /// The stripped contents of the password file.
    pub fn password_on_disk(&self) -> String {
        self.read("vault-password.txt").trim().to_string()
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
