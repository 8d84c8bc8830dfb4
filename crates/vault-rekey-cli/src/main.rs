#![forbid(unsafe_code)]

mod output;
mod prompt;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vault_rekey_core::vault::{NewPassword, Rekey};

use crate::prompt::prompt_new_password;

#[derive(Parser)]
#[command(name = "vault-rekey")]
#[command(author, version, about = "Re-encrypt every Ansible Vault secret in a repository under a new password")]
struct Cli {
    /// Path to the Ansible repository
    #[arg(short = 'r', long, default_value = ".", value_name = "DIR")]
    repo: PathBuf,

    /// Path to the current vault password file
    /// [default: vault-password.txt under the repository root]
    #[arg(short = 'p', long, value_name = "FILE")]
    password_file: Option<PathBuf>,

    /// Only rekey the given file instead of scanning the repository
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Where plaintext backups are written
    /// [default: .rekey-backups under the repository root]
    #[arg(long, value_name = "DIR")]
    backup_dir: Option<PathBuf>,

    /// Decrypt and back up, but overwrite nothing
    #[arg(long)]
    dry_run: bool,

    /// Keep the plaintext backups after a successful run
    #[arg(short = 'k', long)]
    keep_backups: bool,

    /// Prompt for the new password instead of generating one
    #[arg(long, conflicts_with = "generate_length")]
    prompt_new_password: bool,

    /// Length of the generated new password
    #[arg(
        long,
        default_value_t = 128,
        value_name = "N",
        value_parser = clap::value_parser!(u16).range(8..)
    )]
    generate_length: u16,

    /// Print the report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Suppress the run summary and all logging below error level
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    let new_password = if cli.prompt_new_password {
        NewPassword::Provided(prompt_new_password()?)
    } else {
        NewPassword::Generate(usize::from(cli.generate_length))
    };

    let mut rekey = Rekey::new(&cli.repo)
        .with_new_password(new_password)
        .dry_run(cli.dry_run)
        .keep_backups(cli.keep_backups);
    if let Some(path) = cli.password_file {
        rekey = rekey.with_password_file(path);
    }
    if let Some(path) = cli.backup_dir {
        rekey = rekey.with_backup_dir(path);
    }
    if let Some(path) = cli.file {
        rekey = rekey.with_file(path);
    }

    let report = rekey.run()?;

    if cli.json {
        output::print_json(&report)?;
    } else if !cli.quiet {
        output::print_summary(&report);
    }

    // Per-file failures are reported, not fatal.
    Ok(())
}
