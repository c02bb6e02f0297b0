//! Runs the `formgate` binary against a SQLite tenant.
//!
//! Run with: `cargo test -p formgate-cli`

#![cfg(feature = "sqlite")]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{Value, json};
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn write_tenants(dir: &TempDir) -> PathBuf {
    let tenants = json!([{
        "name": "Acme",
        "storage": {
            "tenant_id": "acme",
            "engine": "sqlite",
            "connection_mode": "parameters",
            "database_name": dir.path().join("acme.db").to_string_lossy(),
            "target_relation": "users"
        }
    }]);
    let path = dir.path().join("tenants.json");
    std::fs::write(&path, tenants.to_string()).unwrap();
    path
}

fn formgate(tenants: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_formgate"))
        .env_remove("RUST_LOG")
        .env("FORMGATE_HASH_COST", "4")
        .arg("--tenants")
        .arg(tenants)
        .args(args)
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_submit_then_find() {
    let dir = TempDir::new().unwrap();
    let tenants = write_tenants(&dir);

    let output = formgate(
        &tenants,
        &["submit", "--tenant", "acme", "--data", r#"{"name": "Jo", "email": "jo@x.com"}"#],
    );
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["status"], "stored");

    let output = formgate(
        &tenants,
        &["find", "--tenant", "acme", "--filter", r#"{"email": "jo@x.com"}"#],
    );
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["name"], "Jo");
}

#[test]
fn test_unknown_tenant_prints_public_error() {
    let dir = TempDir::new().unwrap();
    let tenants = write_tenants(&dir);

    let output = formgate(
        &tenants,
        &["find", "--tenant", "globex", "--filter", r#"{"email": "jo@x.com"}"#],
    );
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(r#"{"error":"Tenant not found"}"#));
}

#[test]
fn test_configuration_errors() {
    let dir = TempDir::new().unwrap();
    let tenants = write_tenants(&dir);

    let output = formgate(&tenants, &["--hash-cost", "99", "verify-config"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration error: Hash cost must be between 4 and 31"));
}

#[test]
fn test_verify_config() {
    let dir = TempDir::new().unwrap();
    let tenants = write_tenants(&dir);

    let output = formgate(&tenants, &["verify-config", "--connect"]);
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["tenants"][0]["tenant_id"], "acme");
    assert_eq!(report["tenants"][0]["reachable"], true);
}
