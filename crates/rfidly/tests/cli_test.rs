//! Integration tests for the `rfidly` CLI binary.
//!
//! Nothing here needs a reader, a device hub, or a push service. Commands
//! that reach the backend run against a local mock server.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// Nothing listens here; commands that never touch the backend still need
// a station to be built.
const UNUSED_BACKEND: &str = "http://127.0.0.1:9";

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `rfidly` binary with env isolation.
///
/// Clears all `RFIDLY_*` env vars and points config and data directories
/// at `home` so tests never touch the user's real configuration.
fn rfidly_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("rfidly");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("NO_COLOR", "1")
        .env_remove("RFIDLY_PROFILE")
        .env_remove("RFIDLY_BACKEND")
        .env_remove("RFIDLY_HUB")
        .env_remove("RFIDLY_OUTPUT")
        .env_remove("RFIDLY_TIMEOUT");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = rfidly_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_flag() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("devices")
            .and(predicate::str::contains("scan"))
            .and(predicate::str::contains("selection"))
            .and(predicate::str::contains("batch")),
    );
}

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rfidly"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let home = tempfile::tempdir().unwrap();
    let output = rfidly_cmd(home.path()).arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_discover_without_config_fails() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path())
        .args(["devices", "discover"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config").or(predicate::str::contains("profile")));
}

#[test]
fn test_unknown_profile_fails() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path())
        .args(["--profile", "warehouse", "selection", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("warehouse"));
}

#[test]
fn test_invalid_output_format() {
    let home = tempfile::tempdir().unwrap();
    let output = rfidly_cmd(home.path())
        .args(["--output", "invalid", "selection", "show"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected error about invalid output format:\n{text}"
    );
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show_no_config() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[defaults]"));
}

#[test]
fn test_config_path_points_into_config_home() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_set_then_show_masks_push_key() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path())
        .args(["config", "set", "push-key", "super-secret"])
        .assert()
        .success();
    rfidly_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("push_key = \"****\""))
        .stdout(predicate::str::contains("super-secret").not());
}

#[test]
fn test_config_set_unknown_key() {
    let home = tempfile::tempdir().unwrap();
    let output = rfidly_cmd(home.path())
        .args(["config", "set", "controller", "x"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("backend_url"));
}

// ── Simulation and selection ────────────────────────────────────────

#[test]
fn test_simulate_prints_records() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path())
        .args(["--backend", UNUSED_BACKEND, "-o", "json"])
        .args(["simulate", "-n", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("E2"));
}

#[test]
fn test_simulate_zero_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    let output = rfidly_cmd(home.path())
        .args(["--backend", UNUSED_BACKEND, "simulate", "-n", "0"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_selection_survives_between_runs() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path())
        .args(["--backend", UNUSED_BACKEND, "-q"])
        .args(["simulate", "-n", "3", "--select-all"])
        .assert()
        .success();

    let output = rfidly_cmd(home.path())
        .args(["--backend", UNUSED_BACKEND, "-o", "plain", "selection", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let ids: Vec<_> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(ids.len(), 3, "Expected three selected ids:\n{stdout}");
    assert!(ids.iter().all(|id| id.starts_with("tmp-")));

    rfidly_cmd(home.path())
        .args(["--backend", UNUSED_BACKEND, "selection", "drop", ids[0]])
        .assert()
        .success();
    rfidly_cmd(home.path())
        .args(["--backend", UNUSED_BACKEND, "-o", "plain", "selection", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(ids[0]).not())
        .stdout(predicate::str::contains(ids[1]));
}

#[test]
fn test_selection_drop_rejects_malformed_id() {
    let home = tempfile::tempdir().unwrap();
    let output = rfidly_cmd(home.path())
        .args(["--backend", UNUSED_BACKEND, "selection", "drop", "junk"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_selection_drop_unknown_id_is_not_found() {
    let home = tempfile::tempdir().unwrap();
    let output = rfidly_cmd(home.path())
        .args(["--backend", UNUSED_BACKEND, "selection", "drop", "999"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_batch_create_with_empty_selection_fails() {
    let home = tempfile::tempdir().unwrap();
    rfidly_cmd(home.path())
        .args(["--backend", UNUSED_BACKEND, "batch", "create", "-n", "Morning"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no transactions selected"));
}

// ── Backend reads ───────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_batches_list_against_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/batch/list"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statusCode": 200,
            "message": "ok",
            "data": {
                "data": [
                    { "id": 12, "name": "Morning", "transactionIds": [1, 2, 3] },
                    { "id": 13, "name": "Evening", "description": "dock 4" }
                ],
                "meta": { "total": 2, "lastPage": 1, "currentPage": 1 }
            }
        })))
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let backend = server.uri();
    let output = tokio::task::spawn_blocking(move || {
        rfidly_cmd(home.path())
            .args(["--backend", &backend, "-o", "plain", "batches", "list"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["12", "13"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tags_get_missing_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tag/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statusCode": 200,
            "message": "ok",
            "data": { "data": [{ "id": 1, "tag": "E2AAAA" }], "meta": { "total": 1 } }
        })))
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let backend = server.uri();
    let output = tokio::task::spawn_blocking(move || {
        rfidly_cmd(home.path())
            .args(["--backend", &backend, "tags", "get", "E2FFFF"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("E2FFFF"));
}
