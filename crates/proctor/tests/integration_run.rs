//! Integration tests for `proctor run`

use assert_cmd::Command;
use predicates::str as pred_str;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write a config plus two suite manifests (3 + 2 tests) into `dir`
fn write_workspace(dir: &Path) {
    fs::write(
        dir.join("a.json5"),
        r#"{
            name: "a",
            tests: [
                { title: "one" },
                { title: "two", tags: ["slow"] },
                { title: "three" },
            ],
        }"#,
    )
    .unwrap();
    fs::write(
        dir.join("b.json5"),
        r#"{ name: "b", tests: [{ title: "four" }, { title: "five" }] }"#,
    )
    .unwrap();
    fs::write(
        dir.join("config.json5"),
        r#"{ testFiles: ["a.json5", "b.json5"] }"#,
    )
    .unwrap();
}

#[test]
fn run_executes_declared_suites() {
    let tmp = TempDir::new().unwrap();
    write_workspace(tmp.path());

    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.current_dir(tmp.path())
        .args(["run", "--config", "config.json5"])
        .assert()
        .success();
}

#[test]
fn run_with_no_tests_defined_fails() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("config.json5"), "{}").unwrap();

    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.current_dir(tmp.path())
        .args(["run", "--config", "config.json5"])
        .assert()
        .failure()
        .stderr(pred_str::contains("No tests defined."));
}

#[test]
fn run_dry_run_writes_report() {
    let tmp = TempDir::new().unwrap();
    write_workspace(tmp.path());

    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.current_dir(tmp.path())
        .args(["run", "--config", "config.json5", "--dry-run"])
        .assert()
        .success();

    let raw = fs::read_to_string(tmp.path().join("dry-run-report.json")).unwrap();
    let report: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(report["testCount"], 5);
    assert_eq!(report["tests"].as_array().unwrap().len(), 5);
}

#[test]
fn run_exclude_tag_filters_the_dry_run_report() {
    let tmp = TempDir::new().unwrap();
    write_workspace(tmp.path());

    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.current_dir(tmp.path())
        .args([
            "run",
            "--config",
            "config.json5",
            "--dry-run",
            "--exclude-tag",
            "slow",
        ])
        .assert()
        .success();

    let raw = fs::read_to_string(tmp.path().join("dry-run-report.json")).unwrap();
    let report: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(report["testCount"], 4);
    assert_eq!(
        report["testsExcludedByTag"].as_array().unwrap(),
        &[serde_json::json!("a two")]
    );
}

#[test]
fn run_with_broken_manifest_fails() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("broken.json5"), "{ not a manifest").unwrap();
    fs::write(
        tmp.path().join("config.json5"),
        r#"{ testFiles: ["broken.json5"] }"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.current_dir(tmp.path())
        .args(["run", "--config", "config.json5"])
        .assert()
        .failure()
        .stderr(pred_str::contains("Failed to parse suite manifest"));
}
