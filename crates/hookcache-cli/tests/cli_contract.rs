#![allow(deprecated)]
//! Exit codes and output of the `hookcache` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

const SECRET: &str = "cli-contract-secret";

fn hookcache() -> Command {
    let mut cmd = Command::cargo_bin("hookcache").unwrap();
    for var in [
        "HOOKCACHE_CONFIG",
        "HOOKCACHE_WEBHOOK_SECRET",
        "HOOKCACHE_ALLOWED_SOURCES",
        "HOOKCACHE_SIGNATURE_ALGORITHMS",
        "HOOKCACHE_CATALOG_PATH",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn sign(payload: &std::path::Path) -> String {
    let output = hookcache()
        .env("HOOKCACHE_WEBHOOK_SECRET", SECRET)
        .arg("sign")
        .arg(payload)
        .output()
        .unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

#[test]
fn sign_then_verify_accepts() {
    let dir = tempdir().unwrap();
    let payload = dir.path().join("body.json");
    fs::write(&payload, br#"{"event":"workflow.completed","id":"wf-42"}"#).unwrap();

    let signature = sign(&payload);
    assert!(signature.starts_with("sha256="));

    let output = hookcache()
        .env("HOOKCACHE_WEBHOOK_SECRET", SECRET)
        .args(["verify", payload.to_str().unwrap(), "--signature", &signature])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["valid"], Value::Bool(true));
    assert_eq!(result["security_score"], 100);
}

#[test]
fn tampered_payload_is_rejected_with_exit_2() {
    let dir = tempdir().unwrap();
    let payload = dir.path().join("body.json");
    fs::write(&payload, br#"{"amount":100}"#).unwrap();
    let signature = sign(&payload);
    fs::write(&payload, br#"{"amount":900}"#).unwrap();

    let output = hookcache()
        .env("HOOKCACHE_WEBHOOK_SECRET", SECRET)
        .args(["verify", payload.to_str().unwrap(), "--signature", &signature])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["valid"], Value::Bool(false));
    assert_eq!(result["details"]["signature_valid"], Value::Bool(false));
}

#[test]
fn sign_without_secret_fails() {
    let dir = tempdir().unwrap();
    let payload = dir.path().join("body.json");
    fs::write(&payload, b"{}").unwrap();

    hookcache()
        .arg("sign")
        .arg(&payload)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no HMAC secret"));
}

#[test]
fn config_from_file_is_redacted() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("hookcache.yaml");
    fs::write(
        &config,
        "security:\n  hmac_secret: very-private\ncoordinator:\n  call_timeout_ms: 1234\n",
    )
    .unwrap();

    hookcache()
        .arg("--config")
        .arg(&config)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("<redacted>"))
        .stdout(predicate::str::contains("call_timeout_ms: 1234"))
        .stdout(predicate::str::contains("very-private").not());
}

#[test]
fn catalog_lists_page_widgets() {
    hookcache()
        .args(["catalog", "--page", "strategy-plans"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kpi-dashboard"))
        .stdout(predicate::str::contains("okr-tracker"));

    hookcache()
        .args(["catalog", "--page", "no-such-page"])
        .assert()
        .code(1);
}
