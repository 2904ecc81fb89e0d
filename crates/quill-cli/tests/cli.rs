//! Binary-level tests for the `quill` command.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn quill() -> Command {
    Command::cargo_bin("quill").unwrap()
}

// ============================================================================
// Test: Informational Commands
// ============================================================================

#[test]
fn test_channels_table() {
    quill()
        .arg("channels")
        .assert()
        .success()
        .stdout(predicate::str::contains("Gameplay"))
        .stdout(predicate::str::contains("Subsystem"));
}

#[test]
fn test_init_config_prints_toml() {
    quill()
        .args(["init-config", "--tier", "production"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tier = \"production\""))
        .stdout(predicate::str::contains("[rotation]"));
}

// ============================================================================
// Test: Run Over Stdin
// ============================================================================

#[test]
fn test_run_writes_log_file() {
    let dir = tempdir().unwrap();
    let logs = dir.path().join("logs");

    quill()
        .args(["--format", "json", "run", "--channel", "Network", "--dir"])
        .arg(&logs)
        .write_stdin("connected\nhandshake done\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"accepted\": 2"));

    let files: Vec<_> = fs::read_dir(&logs).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn test_run_emits_json_diagnostics() {
    let dir = tempdir().unwrap();

    quill()
        .env("RUST_LOG", "info")
        .args(["run", "--log-format", "json", "--dir"])
        .arg(dir.path())
        .write_stdin("hello\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("\"level\":\"INFO\""))
        .stderr(predicate::str::contains("logging pipeline started"));
}

#[test]
fn test_run_with_invalid_config_fails() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("quill.toml");
    fs::write(&config, "[queue]\ncapacity = 0\n").unwrap();

    quill()
        .args(["run", "--config"])
        .arg(&config)
        .write_stdin("x\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("queue.capacity"));
}

// ============================================================================
// Test: Directory Maintenance
// ============================================================================

#[test]
fn test_usage_and_cleanup() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("quill_UI_20000101_001.json"), "{}\n").unwrap();

    quill()
        .args(["usage", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 file(s)"));

    quill()
        .args(["cleanup", "--dry-run", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("would be deleted"));
    assert!(dir.path().join("quill_UI_20000101_001.json").exists());

    quill()
        .args(["cleanup", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 1 file(s)"));
    assert!(!dir.path().join("quill_UI_20000101_001.json").exists());
}
