//! CLI integration tests

use std::process::{Command, Output};

fn ewctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ewctl"))
        .args(args)
        .env_remove("EWCTL_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = ewctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Edgewatch"), "Should show app name");
    assert!(stdout.contains("alerts"), "Should show alerts command");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = ewctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("ewctl"), "Should show binary name");
}

#[test]
fn test_alerts_list_help() {
    let output = ewctl(&["alerts", "list", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Alerts list help should succeed");
    assert!(stdout.contains("--limit"), "Should show limit option");
}

#[test]
fn test_alerts_evaluate_help() {
    let output = ewctl(&["alerts", "evaluate", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Evaluate help should succeed");
    assert!(stdout.contains("--device-id"), "Should show device-id option");
    assert!(stdout.contains("--status"), "Should show status option");
    assert!(stdout.contains("--reading"), "Should show reading option");
    assert!(stdout.contains("offline"), "Should list status values");
}

#[test]
fn test_evaluate_requires_reading() {
    let output = ewctl(&["alerts", "evaluate", "--device-id", "d1"]);

    assert!(!output.status.success(), "Missing reading should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--reading"), "Should name the missing argument");
}

#[test]
fn test_invalid_status_value() {
    let output = ewctl(&[
        "alerts", "evaluate", "--device-id", "d1", "--status", "asleep", "--reading", "1",
    ]);

    assert!(!output.status.success(), "Unknown status should fail");
}

#[test]
fn test_invalid_format_value() {
    let output = ewctl(&["--format", "yaml", "status"]);

    assert!(!output.status.success(), "Unknown format should fail");
}

#[test]
fn test_unreachable_agent_fails_cleanly() {
    let output = ewctl(&["--api-url", "http://127.0.0.1:1", "status"]);

    assert!(!output.status.success(), "Unreachable agent should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to send request"));
}
