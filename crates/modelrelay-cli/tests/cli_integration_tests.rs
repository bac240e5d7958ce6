//! CLI integration tests for modelrelay
//!
//! Exercises the offline paths of the modelrelay CLI using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command isolated from the user's config and tokens
#[allow(deprecated)]
fn modelrelay_cmd(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("modelrelay").unwrap();
    cmd.current_dir(config_dir.path());
    cmd.env("MODELRELAY_CONFIG_DIR", config_dir.path());
    cmd.env_remove("MODELRELAY_API_KEY");
    cmd.env_remove("GITHUB_TOKEN");
    cmd.env("RUST_LOG", "off");
    cmd
}

fn write_config(dir: &TempDir, contents: &str) {
    std::fs::write(dir.path().join("config.toml"), contents).unwrap();
}

#[test]
fn test_help_command() {
    let dir = TempDir::new().unwrap();
    modelrelay_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("catalog"))
        .stdout(predicate::str::contains("fallbacks"))
        .stdout(predicate::str::contains("complete"));
}

#[test]
fn test_version_output() {
    let dir = TempDir::new().unwrap();
    modelrelay_cmd(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("modelrelay"));
}

#[test]
fn test_config_show_defaults() {
    let dir = TempDir::new().unwrap();
    modelrelay_cmd(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("catalog.ttl_secs = 300"))
        .stdout(predicate::str::contains("availability.cooldown_secs = 300"))
        .stdout(predicate::str::contains("dispatch.max_attempts = 3"))
        .stdout(predicate::str::contains("not set"));
}

#[test]
fn test_config_show_reads_file() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "[catalog]\nttl_secs = 42\n");

    modelrelay_cmd(&dir)
        .args(["config", "get", "catalog.ttl_secs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_config_show_json() {
    let dir = TempDir::new().unwrap();
    let output = modelrelay_cmd(&dir)
        .args(["--format", "json", "config", "show"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["dispatch.max_attempts"], "3");
}

#[test]
fn test_config_token_is_redacted() {
    let dir = TempDir::new().unwrap();
    modelrelay_cmd(&dir)
        .env("GITHUB_TOKEN", "ghp_supersecretvalue1234")
        .args(["config", "get", "upstream.api_key"])
        .assert()
        .success()
        .stdout(predicate::str::contains("***1234"))
        .stdout(predicate::str::contains("supersecret").not());
}

#[test]
fn test_config_unknown_key_fails() {
    let dir = TempDir::new().unwrap();
    modelrelay_cmd(&dir)
        .args(["config", "get", "nope.nothing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_api_key_in_config_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "[upstream]\napi_key = \"ghp_nope\"\n");

    modelrelay_cmd(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("environment variables"));
}

#[test]
fn test_config_path() {
    let dir = TempDir::new().unwrap();
    modelrelay_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_catalog_without_token_reports_no_catalog() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "[upstream]\nbase_url = \"http://127.0.0.1:9\"\n");

    modelrelay_cmd(&dir)
        .arg("catalog")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No model catalog available"));
}

#[test]
fn test_invalid_tier_filter_is_rejected() {
    let dir = TempDir::new().unwrap();
    modelrelay_cmd(&dir)
        .args(["catalog", "--tier", "premium"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown rate-limit tier"));
}
