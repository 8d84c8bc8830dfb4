//! End-to-end tests for the repository-wide rekey pass.
//!
//! Each test seeds a throwaway Ansible-style repository, runs [`Rekey`]
//! against it, and checks the on-disk outcome.

mod common;

use std::fs;
use std::path::PathBuf;

use common::{CURRENT_PASSWORD, TestRepo};
use serde_yaml::Value;
use vault_rekey_core::crypto;
use vault_rekey_core::document::EncryptedScalar;
use vault_rekey_core::password::Password;
use vault_rekey_core::vault::{NewPassword, Rekey, RekeyReport, VaultFileError, restore_backups};

const NEW_PASSWORD: &str = "fresh-vault-password";

fn provided(new: &str) -> NewPassword {
    NewPassword::Provided(Password::new(new))
}

fn run_rekey(repo: &TestRepo) -> RekeyReport {
    Rekey::new(&repo.root)
        .with_new_password(provided(NEW_PASSWORD))
        .run()
        .expect("rekey run")
}

// ============================================================================
// Whole-repository rekey
// ============================================================================

#[test]
fn rekeys_a_fully_encrypted_file() {
    let repo = TestRepo::new();
    let path = repo.write_full_vault("group_vars/all/vault.yml", "db_password: hunter2\n");

    let report = run_rekey(&repo);

    assert!(report.is_clean());
    assert_eq!(
        report.rekeyed,
        vec![PathBuf::from("group_vars/all/vault.yml")]
    );
    assert!(!report.new_password_generated);

    let rewritten = fs::read(&path).expect("read rewritten file");
    assert_eq!(
        crypto::decrypt(&rewritten, &Password::new(NEW_PASSWORD)).expect("decrypt new"),
        b"db_password: hunter2\n"
    );
    assert!(crypto::decrypt(&rewritten, &repo.current_password()).is_err());
    assert_eq!(repo.password_on_disk(), NEW_PASSWORD);
    // Clean run, so the backup tree is gone again.
    assert!(!report.backups_kept);
    assert!(!report.backup_root.exists());
}

#[test]
fn rekeys_inline_secrets_and_preserves_plain_yaml() {
    let repo = TestRepo::new();
    let db = repo.vault_scalar("s3cret", 2);
    let token = repo.vault_scalar("t0ken", 6);
    repo.write(
        "host_vars/web.yml",
        &format!(
            "ansible_user: deploy\ndb_password: {db}\napi:\n  keys:\n    - {token}\nregion: us-east-1\n"
        ),
    );

    let before = repo.read("host_vars/web.yml");
    let report = run_rekey(&repo);
    assert!(report.is_clean());
    assert_eq!(report.rekeyed, vec![PathBuf::from("host_vars/web.yml")]);

    let after = repo.read("host_vars/web.yml");
    assert_ne!(before, after);

    let doc: Value = serde_yaml::from_str(&after).expect("parse rewritten YAML");
    assert_eq!(
        doc.get("ansible_user"),
        Some(&Value::String("deploy".into()))
    );
    assert_eq!(doc.get("region"), Some(&Value::String("us-east-1".into())));
    let keys: Vec<&str> = doc
        .as_mapping()
        .expect("mapping document")
        .iter()
        .filter_map(|(key, _)| key.as_str())
        .collect();
    assert_eq!(keys, vec!["ansible_user", "db_password", "api", "region"]);

    let new_password = Password::new(NEW_PASSWORD);
    let db = EncryptedScalar::from_value(doc.get("db_password").expect("db_password"))
        .expect("tagged scalar");
    assert_eq!(db.decrypt(&new_password).expect("decrypt"), b"s3cret");
    assert!(db.decrypt(&repo.current_password()).is_err());

    let token_value = doc
        .get("api")
        .and_then(|api| api.get("keys"))
        .and_then(|keys| keys.get(0))
        .expect("api.keys[0]");
    let token = EncryptedScalar::from_value(token_value).expect("tagged scalar");
    assert_eq!(token.decrypt(&new_password).expect("decrypt"), b"t0ken");
}

#[test]
fn walks_the_repository_and_skips_housekeeping_paths() {
    let repo = TestRepo::new();
    repo.write_full_vault("group_vars/all/vault.yml", "a: 1\n");
    let secret = repo.vault_scalar("inline", 2);
    repo.write("roles/db/vars/main.yml", &format!("password: {secret}\n"));
    repo.write("plain.yml", "nothing: here\n");
    repo.write("notes.md", "# not yaml\n");
    repo.write_full_vault(".git/objects/pack/vault.yml", "g: 1\n");
    let template = repo.write(
        "roles/db/templates/config.yml.j2",
        "token: {{ vaulted_token }}\n",
    );

    let git_before = repo.read_bytes(".git/objects/pack/vault.yml");
    let template_before = fs::read(&template).expect("read template");
    let plain_before = repo.read("plain.yml");

    let report = run_rekey(&repo);

    assert!(report.is_clean());
    assert_eq!(
        report.rekeyed,
        vec![
            PathBuf::from("group_vars/all/vault.yml"),
            PathBuf::from("roles/db/vars/main.yml"),
        ]
    );
    assert_eq!(repo.read_bytes(".git/objects/pack/vault.yml"), git_before);
    assert_eq!(fs::read(&template).expect("read template"), template_before);
    assert_eq!(repo.read("plain.yml"), plain_before);
}

// ============================================================================
// Dry run
// ============================================================================

#[test]
fn dry_run_reports_without_touching_anything() {
    let repo = TestRepo::new();
    let full = repo.write_full_vault("group_vars/vault.yml", "a: 1\n");
    let secret = repo.vault_scalar("inline", 2);
    let partial = repo.write("group_vars/app.yml", &format!("token: {secret}\n"));

    let full_before = fs::read(&full).expect("read");
    let partial_before = fs::read(&partial).expect("read");

    let report = Rekey::new(&repo.root)
        .with_new_password(provided(NEW_PASSWORD))
        .dry_run(true)
        .run()
        .expect("dry run");

    assert!(report.dry_run);
    assert!(report.is_clean());
    assert!(!report.new_password_generated);
    assert_eq!(
        report.rekeyed,
        vec![
            PathBuf::from("group_vars/app.yml"),
            PathBuf::from("group_vars/vault.yml"),
        ]
    );
    assert_eq!(fs::read(&full).expect("read"), full_before);
    assert_eq!(fs::read(&partial).expect("read"), partial_before);
    assert_eq!(repo.password_on_disk(), CURRENT_PASSWORD);
    // Backups from the inspection pass are cleaned up again.
    assert!(!report.backup_root.exists());
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn one_undecryptable_file_does_not_stop_the_others() {
    let repo = TestRepo::new();
    let good = repo.write_full_vault("group_vars/good.yml", "fine: yes\n");
    let foreign = repo.vault_scalar_under("locked", "some-other-password", 2);
    let bad = repo.write("group_vars/bad.yml", &format!("secret: {foreign}\n"));
    let bad_before = fs::read(&bad).expect("read");

    let report = run_rekey(&repo);

    assert!(!report.is_clean());
    assert_eq!(report.processed(), 2);
    assert_eq!(report.rekeyed, vec![PathBuf::from("group_vars/good.yml")]);
    let failure = &report.failures[0];
    assert_eq!(failure.path, PathBuf::from("group_vars/bad.yml"));
    assert!(matches!(failure.error, VaultFileError::Decrypt(_)));

    // The failed file is untouched and still under the old password.
    assert_eq!(fs::read(&bad).expect("read"), bad_before);
    // The good file moved to the new password anyway.
    let rewritten = fs::read(&good).expect("read");
    assert_eq!(
        crypto::decrypt(&rewritten, &Password::new(NEW_PASSWORD)).expect("decrypt"),
        b"fine: yes\n"
    );

    // Backups stay behind for recovery, old password alongside.
    assert!(report.backups_kept);
    assert_eq!(
        fs::read_to_string(report.backup_root.join("group_vars/good.yml"))
            .expect("read backup"),
        "fine: yes\n"
    );
    assert_eq!(
        fs::read_to_string(report.backup_root.join("vault-password.txt"))
            .expect("read password backup")
            .trim(),
        CURRENT_PASSWORD
    );
}

#[test]
fn keep_backups_retains_plaintext_copies_on_success() {
    let repo = TestRepo::new();
    repo.write_full_vault("vault.yml", "kept: around\n");

    let report = Rekey::new(&repo.root)
        .with_new_password(provided(NEW_PASSWORD))
        .keep_backups(true)
        .run()
        .expect("rekey run");

    assert!(report.is_clean());
    assert!(report.backups_kept);
    assert_eq!(report.backup_root, repo.path(".rekey-backups"));
    assert_eq!(
        fs::read_to_string(report.backup_root.join("vault.yml")).expect("read backup"),
        "kept: around\n"
    );
}

#[test]
fn a_custom_backup_dir_inside_the_root_is_not_scanned() {
    let repo = TestRepo::new();
    repo.write_full_vault("vault.yml", "x: 1\n");

    let report = Rekey::new(&repo.root)
        .with_new_password(provided(NEW_PASSWORD))
        .with_backup_dir(repo.path("saved"))
        .keep_backups(true)
        .run()
        .expect("first run");
    assert_eq!(report.backup_root, repo.path("saved"));
    assert_eq!(
        fs::read_to_string(repo.path("saved/vault.yml")).expect("read backup"),
        "x: 1\n"
    );

    // Plant an encrypted decoy in the backup dir; a second pass must
    // not pick it up as a candidate.
    repo.write_full_vault("saved/decoy.yml", "decoy: 1\n");
    let report = Rekey::new(&repo.root)
        .with_new_password(provided("third-password"))
        .with_backup_dir(repo.path("saved"))
        .run()
        .expect("second run");
    assert!(report.is_clean());
    assert_eq!(report.rekeyed, vec![PathBuf::from("vault.yml")]);
}

// ============================================================================
// Backup restore
// ============================================================================

#[test]
fn restoring_kept_backups_reproduces_the_backed_up_bytes() {
    let repo = TestRepo::new();
    repo.write_full_vault("group_vars/all/vault.yml", "a: 1\n");
    let secret = repo.vault_scalar("inline", 2);
    repo.write("host_vars/web.yml", &format!("token: {secret}\n"));

    let report = Rekey::new(&repo.root)
        .with_new_password(provided(NEW_PASSWORD))
        .keep_backups(true)
        .run()
        .expect("rekey run");
    assert!(report.is_clean());
    assert!(report.backups_kept);

    let restored = restore_backups(&report.backup_root, &repo.root).expect("restore");

    // Every backed-up file is back at its original relative path, byte
    // for byte, the old password file included.
    for rel in [
        "group_vars/all/vault.yml",
        "host_vars/web.yml",
        "vault-password.txt",
    ] {
        assert!(restored.contains(&repo.path(rel)));
        assert_eq!(
            repo.read_bytes(rel),
            fs::read(report.backup_root.join(rel)).expect("read backup")
        );
    }
    assert_eq!(repo.read("group_vars/all/vault.yml"), "a: 1\n");
    assert_eq!(repo.password_on_disk(), CURRENT_PASSWORD);
}

// ============================================================================
// Single-file mode
// ============================================================================

#[test]
fn single_file_mode_rekeys_only_that_file() {
    let repo = TestRepo::new();
    let target = repo.write_full_vault("group_vars/target.yml", "t: 1\n");
    let other = repo.write_full_vault("group_vars/other.yml", "o: 1\n");
    let other_before = fs::read(&other).expect("read");

    let report = Rekey::new(&repo.root)
        .with_new_password(provided(NEW_PASSWORD))
        .with_file(&target)
        .run()
        .expect("rekey run");

    assert_eq!(report.rekeyed, vec![PathBuf::from("group_vars/target.yml")]);
    assert_eq!(fs::read(&other).expect("read"), other_before);
    let rewritten = fs::read(&target).expect("read");
    assert!(crypto::decrypt(&rewritten, &Password::new(NEW_PASSWORD)).is_ok());
}

#[test]
fn single_file_mode_ignores_a_file_without_secrets() {
    let repo = TestRepo::new();
    let plain = repo.write("group_vars/plain.yml", "nothing: here\n");
    let before = fs::read(&plain).expect("read");

    let report = Rekey::new(&repo.root)
        .with_new_password(provided(NEW_PASSWORD))
        .with_file(&plain)
        .run()
        .expect("rekey run");

    assert!(report.is_clean());
    assert_eq!(report.processed(), 0);
    assert_eq!(fs::read(&plain).expect("read"), before);
    // The password file is still rotated; only the rekey list is empty.
    assert_eq!(repo.password_on_disk(), NEW_PASSWORD);
}

// ============================================================================
// Generated passwords
// ============================================================================

#[test]
fn generated_password_is_written_and_opens_the_rekeyed_files() {
    let repo = TestRepo::new();
    let path = repo.write_full_vault("vault.yml", "gen: 1\n");

    let report = Rekey::new(&repo.root).run().expect("rekey run");

    assert!(report.new_password_generated);
    let written = repo.password_on_disk();
    assert_eq!(written.len(), 128);
    assert_ne!(written, CURRENT_PASSWORD);
    let rewritten = fs::read(&path).expect("read");
    assert_eq!(
        crypto::decrypt(&rewritten, &Password::new(&written)).expect("decrypt"),
        b"gen: 1\n"
    );
}
