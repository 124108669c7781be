//! Corruption recovery tests for the pillbox binary.
//!
//! A damaged roster must stop the program instead of silently resetting
//! dosing state; damaged outbox lines are skipped.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pillbox"));
    cmd.arg("--data-dir")
        .arg(dir)
        .arg("--config")
        .arg(dir.join("config.toml"));
    cmd
}

fn setup_test_dir() -> TempDir {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("config.toml"), "").unwrap();
    temp_dir
}

#[test]
fn test_corrupted_roster_is_an_error() {
    let temp_dir = setup_test_dir();
    let roster_path = temp_dir.path().join("roster.json");
    fs::write(&roster_path, "{ invalid json }}}}").unwrap();

    cli(temp_dir.path()).arg("status").assert().failure();

    cli(temp_dir.path())
        .args(["add", "--name", "Aspirin", "--times-per-day", "1"])
        .assert()
        .failure();

    // Left untouched for the user to inspect
    assert_eq!(fs::read_to_string(&roster_path).unwrap(), "{ invalid json }}}}");
}

#[test]
fn test_corrupted_outbox_lines_are_skipped() {
    let temp_dir = setup_test_dir();
    fs::write(
        temp_dir.path().join("outbox.jsonl"),
        "not json\n{\"medicineName\": 3}\n\n",
    )
    .unwrap();

    cli(temp_dir.path())
        .arg("flush")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing queued."));
}

#[test]
fn test_invalid_config_is_an_error() {
    let temp_dir = setup_test_dir();
    fs::write(
        temp_dir.path().join("config.toml"),
        "[dispenser]\npills_per_box = 0\n",
    )
    .unwrap();

    cli(temp_dir.path()).arg("status").assert().failure();
}

#[test]
fn test_missing_roster_is_empty() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No medicines"));
}
