use anyhow::{bail, Result};
use rpassword::read_password;
use std::io::{self, Write};

use vault_rekey_core::Password;

/// Prompt for the new vault password, asking twice to catch typos.
/// Input is hidden and not echoed to the terminal.
///
/// For non-interactive use, leave the prompt off and let the tool
/// generate a password instead.
pub fn prompt_new_password() -> Result<Password> {
    eprint!("New vault password: ");
    io::stderr().flush()?;
    let first = read_password()?;

    if first.is_empty() {
        bail!("Password cannot be empty");
    }

    eprint!("Confirm new vault password: ");
    io::stderr().flush()?;
    let second = read_password()?;

    if first != second {
        bail!("Passwords do not match");
    }

    Ok(Password::new(&first))
}
