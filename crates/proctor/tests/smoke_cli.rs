//! Smoke tests for basic CLI behavior

use assert_cmd::Command;
use predicates::str as pred_str;

#[test]
fn smoke_help() {
    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(pred_str::contains("Functional test runner"))
        .stdout(pred_str::contains("run"))
        .stdout(pred_str::contains("stats"));
}

#[test]
fn smoke_version() {
    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(pred_str::contains("proctor"));
}

#[test]
fn smoke_run_requires_config_flag() {
    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.arg("run")
        .assert()
        .failure()
        .stderr(pred_str::contains("--config"));
}

#[test]
fn smoke_run_missing_config_file() {
    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.args(["run", "--config", "/definitely/not/here.json5"])
        .assert()
        .failure()
        .stderr(pred_str::contains("Configuration file not found"));
}

#[test]
fn smoke_unknown_subcommand() {
    let mut cmd = Command::cargo_bin("proctor").unwrap();
    cmd.arg("frobnicate").assert().failure();
}
