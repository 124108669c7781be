//! Concurrency tests for the pillbox binary.
//!
//! Several processes dispensing at once must neither lose pill counts nor
//! drop queued log entries.

use assert_cmd::Command;
use std::fs;
use std::path::Path;
use std::thread;

fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pillbox"));
    cmd.arg("--data-dir")
        .arg(dir)
        .arg("--config")
        .arg(dir.join("config.toml"));
    cmd
}

#[test]
fn test_concurrent_offline_dispenses() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let dir = temp_dir.path().to_path_buf();
    fs::write(dir.join("config.toml"), "[dispenser]\npills_per_box = 20\n").unwrap();

    cli(&dir)
        .args(["add", "--name", "Aspirin", "--times-per-day", "4"])
        .args(["--at", "17/08/2025, 08:00:00 am"])
        .assert()
        .success();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let dir = dir.clone();
            thread::spawn(move || {
                cli(&dir)
                    .args(["dispense", "Aspirin", "--offline"])
                    .arg("--at")
                    .arg(format!("17/08/2025, 0{}:00:00 pm", i + 1))
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let outbox = fs::read_to_string(dir.join("outbox.jsonl")).unwrap();
    let entries: Vec<serde_json::Value> = outbox
        .lines()
        .map(|line| serde_json::from_str(line).expect("Corrupted outbox line"))
        .collect();
    assert_eq!(entries.len(), 6);

    let roster: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("roster.json")).unwrap()).unwrap();
    assert_eq!(roster["medicines"][0]["pillsRemaining"], 14);
}
