//! CLI Integration Tests
//!
//! These tests run the `gira` binary for commands that never touch the
//! Bluetooth adapter.
//!
//! ```
//! cargo test --package gira-cli --test cli_integration
//! ```

use std::path::Path;
use std::process::{Command, Output};

/// Run gira with an isolated config file and no device in the environment.
fn run_gira(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gira"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("GIRA_DEVICE")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run gira binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_gira(&dir.path().join("config.toml"), &["--help"]);

    assert!(output.status.success(), "Help should succeed");
    let text = stdout(&output);
    for command in ["open", "close", "stop", "step-up", "step-down", "position", "watch"] {
        assert!(text.contains(command), "Help should list {}", command);
    }
}

#[test]
fn test_encode_position() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_gira(&dir.path().join("config.toml"), &["encode", "position=42"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "F6032001FC10012A");
}

#[test]
fn test_decode_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_gira(&dir.path().join("config.toml"), &["decode", "F7032001F61001FF"]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).starts_with("0%"));
}

#[test]
fn test_out_of_range_position_fails_before_scanning() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_gira(
        &dir.path().join("config.toml"),
        &["position", "150", "--device", "AA:BB:CC:DD:EE:FF"],
    );

    assert!(!output.status.success());
    assert!(stderr(&output).contains("150"), "{}", stderr(&output));
}

#[test]
fn test_missing_device_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_gira(&dir.path().join("config.toml"), &["stop"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("No device specified"));
}

#[test]
fn test_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("gira").join("config.toml");

    let output = run_gira(
        &config,
        &["config", "init", "--device", "AA:BB:CC:DD:EE:FF", "--name", "Study"],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(config.exists());

    let output = run_gira(&config, &["config", "show"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("device = \"AA:BB:CC:DD:EE:FF\""));
    assert!(text.contains("attempts = 5"));

    let output = run_gira(&config, &["config", "validate"]);
    assert!(output.status.success(), "{}", stderr(&output));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "connect_timeout = 0\n").unwrap();

    let output = run_gira(&config, &["config", "validate"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("connect_timeout"));
}

#[test]
fn test_invalid_config_blocks_commands() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "device = \"AA:BB:CC:DD:EE:FF\"\nwrite_timeout = 0\n").unwrap();

    let output = run_gira(&config, &["stop"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("write_timeout"), "{}", stderr(&output));
}
