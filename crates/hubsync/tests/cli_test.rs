//! Integration tests for the `hubsync` CLI binary.
//!
//! These cover argument parsing, help output, shell completions, the
//! offline `config` commands, and connection failures, all without a live
//! hub.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `hubsync` binary with env isolation.
///
/// Clears all `HUBSYNC_*` env vars and points the config file at
/// `config`, so tests never touch the user's real configuration.
fn hubsync_cmd(config: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("hubsync");
    cmd.env("HOME", "/tmp/hubsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/hubsync-cli-test-nonexistent")
        .env("HUBSYNC_CONFIG", config)
        .env("NO_COLOR", "1")
        .env_remove("HUBSYNC_URL")
        .env_remove("HUBSYNC_TOKEN")
        .env_remove("HUBSYNC_OUTPUT")
        .env_remove("HUBSYNC_HUB__URL")
        .env_remove("HUBSYNC_HUB__TOKEN")
        .env_remove("HUBSYNC_HUB__SUPERVISOR_TOKEN")
        .env_remove("HUBSYNC_CLIENT__REQUEST_TIMEOUT_SECS")
        .env_remove("HUBSYNC_CLIENT__MAX_RECONNECT_ATTEMPTS")
        .env_remove("RUST_LOG");
    cmd
}

/// A config path inside a fresh temp dir; the file does not exist yet.
fn scratch() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hubsync").join("config.toml");
    (dir, path)
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
    let (_dir, config) = scratch();
    let output = hubsync_cmd(&config).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config).arg("--help").assert().success().stdout(
        predicate::str::contains("home-automation hub")
            .and(predicate::str::contains("states"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("call")),
    );
}

#[test]
fn test_version_flag() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hubsync"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Argument errors ─────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let (_dir, config) = scratch();
    let output = hubsync_cmd(&config).arg("foobar").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    let (_dir, config) = scratch();
    let output = hubsync_cmd(&config)
        .args(["--output", "invalid", "states"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("invalid"));
}

#[test]
fn test_watch_requires_entity() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .arg("watch")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ENTITY_IDS"));
}

#[test]
fn test_forecast_rejects_unknown_kind() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .args(["forecast", "weather.home", "--kind", "weekly"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("twice_daily"));
}

// ── config show ─────────────────────────────────────────────────────

#[test]
fn test_config_show_falls_back_to_localhost() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("built-in fallback")
                .and(predicate::str::contains("ws://localhost:8123/api/websocket"))
                .and(predicate::str::contains("not set")),
        );
}

#[test]
fn test_config_show_uses_environment() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .env("HUBSYNC_URL", "https://hub.example:8443")
        .env("HUBSYNC_TOKEN", "env-secret-token")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("environment")
                .and(predicate::str::contains("wss://hub.example:8443/api/websocket"))
                .and(predicate::str::contains("env-secret-token").not()),
        );
}

#[test]
fn test_config_show_url_flag_wins_over_environment() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .env("HUBSYNC_URL", "https://hub.example:8443")
        .args(["--url", "http://10.0.0.2:8123", "config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("runtime config")
                .and(predicate::str::contains("ws://10.0.0.2:8123/api/websocket")),
        );
}

#[test]
fn test_config_show_json() {
    let (_dir, config) = scratch();
    let output = hubsync_cmd(&config)
        .args(["-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["websocket_url"], "ws://localhost:8123/api/websocket");
    assert_eq!(value["credential"], false);
    assert_eq!(value["request_timeout_secs"], 10);
}

#[test]
fn test_config_show_token_flag_without_url() {
    let (_dir, config) = scratch();
    let output = hubsync_cmd(&config)
        .args(["--token", "flag-token", "-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["source"], "built-in fallback");
    assert_eq!(value["credential"], true);
}

#[test]
fn test_config_show_token_flag_with_env_url() {
    let (_dir, config) = scratch();
    let output = hubsync_cmd(&config)
        .env("HUBSYNC_URL", "https://hub.example:8443")
        .args(["--token", "flag-token", "-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["source"], "environment");
    assert_eq!(value["credential"], true);
    assert!(!String::from_utf8_lossy(&output.stdout).contains("flag-token"));
}

#[test]
fn test_config_show_rejects_zero_timeout() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .args(["--timeout", "0", "config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("request_timeout_secs"));
}

#[test]
fn test_config_path_honours_env() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(config.display().to_string()));
}

// ── config init ─────────────────────────────────────────────────────

#[test]
fn test_config_init_writes_and_reloads() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .args([
            "config",
            "init",
            "--hub-url",
            "http://hub.local:8123",
            "--hub-token",
            "file-token",
        ])
        .assert()
        .success();

    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.contains("http://hub.local:8123"));

    hubsync_cmd(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("runtime config")
                .and(predicate::str::contains("ws://hub.local:8123/api/websocket"))
                .and(predicate::str::contains("Credential:        set")),
        );
}

#[test]
fn test_config_init_refuses_overwrite_without_force() {
    let (_dir, config) = scratch();
    let init = |force: bool| {
        let mut cmd = hubsync_cmd(&config);
        cmd.args(["config", "init", "--hub-url", "http://hub.local:8123"]);
        if force {
            cmd.arg("--force");
        }
        cmd.output().unwrap()
    };

    assert!(init(false).status.success());
    let second = init(false);
    assert_eq!(second.status.code(), Some(2));
    assert!(combined_output(&second).contains("already exists"));
    assert!(init(true).status.success());
}

#[test]
fn test_config_init_rejects_bad_scheme() {
    let (_dir, config) = scratch();
    hubsync_cmd(&config)
        .args(["config", "init", "--hub-url", "ftp://hub.local"])
        .assert()
        .failure();
    assert!(!config.exists());
}

// ── Connection failures ─────────────────────────────────────────────

#[test]
fn test_states_unreachable_hub() {
    let (_dir, config) = scratch();
    // Port 9 (discard) on loopback is closed in test environments.
    hubsync_cmd(&config)
        .args(["--url", "http://127.0.0.1:9", "states"])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .code(7)
        .stderr(predicate::str::contains("Could not connect"));
}
