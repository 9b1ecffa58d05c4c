//! CLI integration tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn apiflow() -> Command {
    Command::cargo_bin("apiflow").unwrap()
}

#[test]
fn test_list_actions() {
    apiflow()
        .arg(fixture("demo.yml"))
        .arg("--list")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("greet")
                .and(predicate::str::contains("ping"))
                .and(predicate::str::contains("Log a greeting")),
        );
}

#[test]
fn test_validate_clean_config() {
    apiflow()
        .arg(fixture("demo.yml"))
        .arg("--validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_validate_rejects_unknown_commands_and_conditions() {
    apiflow()
        .arg(fixture("invalid.yml"))
        .arg("--validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"));
}

#[test]
fn test_run_offline_action() {
    apiflow()
        .arg(fixture("demo.yml"))
        .arg("greet")
        .assert()
        .success();
}

#[test]
fn test_action_name_required() {
    apiflow()
        .arg(fixture("demo.yml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("action name is required"));
}

#[test]
fn test_unknown_action_fails() {
    apiflow()
        .arg(fixture("demo.yml"))
        .arg("does-not-exist")
        .assert()
        .code(1);
}

#[test]
fn test_missing_config_fails() {
    apiflow()
        .arg("no/such/file.yml")
        .arg("--list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_negative_timeout_rejected() {
    apiflow()
        .arg(fixture("demo.yml"))
        .arg("greet")
        .arg("--timeout=-5")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid timeout"));
}

#[test]
fn test_malformed_param_rejected() {
    apiflow()
        .arg(fixture("demo.yml"))
        .arg("greet")
        .arg("--param")
        .arg("not-a-pair")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("NAME=VALUE"));
}
