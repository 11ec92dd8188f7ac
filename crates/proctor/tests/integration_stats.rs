//! Integration tests for `proctor stats`

use assert_cmd::Command;
use predicates::str as pred_str;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_workspace(dir: &Path, config: &str) {
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
    fs::write(dir.join("config.json5"), config).unwrap();
}

#[test]
fn stats_counts_leaf_tests() {
    let tmp = TempDir::new().unwrap();
    write_workspace(tmp.path(), r#"{ testFiles: ["a.json5", "b.json5"] }"#);

    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.current_dir(tmp.path())
        .args(["stats", "--config", "config.json5"])
        .assert()
        .success()
        .stdout(pred_str::contains("tests: 5"));
}

#[test]
fn stats_json_output() {
    let tmp = TempDir::new().unwrap();
    write_workspace(
        tmp.path(),
        r#"{
            testFiles: ["a.json5", "b.json5"],
            suiteTags: { exclude: ["slow"] },
        }"#,
    );

    let mut cmd = Command::cargo_bin("proctor").unwrap();
    let assert = cmd
        .current_dir(tmp.path())
        .args(["stats", "--config", "config.json5", "--output-format", "json"])
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["testCount"], 4);
    assert_eq!(
        stats["testsExcludedByTag"].as_array().unwrap(),
        &[serde_json::json!("a two")]
    );
}

#[test]
fn stats_rejects_custom_runner_configs() {
    let tmp = TempDir::new().unwrap();
    write_workspace(
        tmp.path(),
        r#"{ testFiles: ["a.json5"], testRunner: "custom" }"#,
    );

    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.current_dir(tmp.path())
        .args(["stats", "--config", "config.json5"])
        .assert()
        .failure()
        .stderr(pred_str::contains(
            "Unable to get test stats for config that uses a custom test runner",
        ));
}
