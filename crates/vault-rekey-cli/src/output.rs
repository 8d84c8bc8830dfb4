use anyhow::Result;
use serde::Serialize;

use vault_rekey_core::RekeyReport;

/// Human-readable run summary on stdout.
pub fn print_summary(report: &RekeyReport) {
    if report.processed() == 0 {
        println!("No vault-encrypted material found");
    } else {
        let action = if report.dry_run { "Would rekey" } else { "Rekeyed" };
        println!("{action} {} file(s)", report.rekeyed.len());
        for path in &report.rekeyed {
            println!("  {}", path.display());
        }

        if !report.is_clean() {
            println!("Skipped {} file(s):", report.failures.len());
            for failure in &report.failures {
                println!("  {}: {}", failure.path.display(), failure.error);
            }
        }
    }

    // The password file is rewritten even when nothing was rekeyed.
    if report.new_password_generated {
        println!("New password written to {}", report.password_file.display());
    }
    if report.backups_kept {
        println!("Backups kept in {}", report.backup_root.display());
    }
}

#[derive(Serialize)]
struct JsonReport {
    dry_run: bool,
    rekeyed: Vec<String>,
    failures: Vec<JsonFailure>,
    backup_root: String,
    backups_kept: bool,
    password_file: String,
    new_password_generated: bool,
}

#[derive(Serialize)]
struct JsonFailure {
    path: String,
    error: String,
}

/// Machine-readable run summary on stdout.
pub fn print_json(report: &RekeyReport) -> Result<()> {
    let payload = JsonReport {
        dry_run: report.dry_run,
        rekeyed: report
            .rekeyed
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
        failures: report
            .failures
            .iter()
            .map(|failure| JsonFailure {
                path: failure.path.display().to_string(),
                error: failure.error.to_string(),
            })
            .collect(),
        backup_root: report.backup_root.display().to_string(),
        backups_kept: report.backups_kept,
        password_file: report.password_file.display().to_string(),
        new_password_generated: report.new_password_generated,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
