//! Integration tests for the cardsync binary.
//!
//! These run the built executable against temporary data directories and
//! check the JSON it prints.

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn cardsync(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cardsync"))
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .output()
        .expect("Failed to run cardsync")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "cardsync failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn test_scan_registers_library() {
    let temp = TempDir::new().unwrap();
    let data_dir = temp.path().join("data");
    let root = temp.path().join("cards");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("notes.txt"), "not a card").unwrap();

    let scan = stdout_json(&cardsync(&data_dir, &["scan", root.to_str().unwrap()]));
    assert_eq!(scan["revision"], 1);
    assert_eq!(scan["scans"][0]["result"]["totalFiles"], 0);

    let libraries = stdout_json(&cardsync(&data_dir, &["libraries"]));
    assert_eq!(libraries.as_array().unwrap().len(), 1);
    assert_eq!(libraries[0]["stats"]["cards"], 0);
}

#[test]
fn test_scan_of_missing_root_fails() {
    let temp = TempDir::new().unwrap();
    let output = cardsync(
        &temp.path().join("data"),
        &["scan", temp.path().join("missing").to_str().unwrap()],
    );
    assert!(!output.status.success());
}

#[test]
fn test_list_on_empty_index() {
    let temp = TempDir::new().unwrap();
    let list = stdout_json(&cardsync(&temp.path().join("data"), &["list", "--text", "dragon"]));
    assert_eq!(list["total"], 0);
    assert!(list["cards"].as_array().unwrap().is_empty());
}

#[test]
fn test_patterns_requires_known_library() {
    let temp = TempDir::new().unwrap();
    let rules = temp.path().join("rules.json");
    std::fs::write(&rules, r#"[{"id": "r1", "pattern": "dragon", "flags": "i"}]"#).unwrap();

    let output = cardsync(
        &temp.path().join("data"),
        &["patterns", "no-such-library", "--rules", rules.to_str().unwrap()],
    );
    assert!(!output.status.success());
}
