//! Integration tests for CLI argument handling
//!
//! None of these reach the network: each one fails or exits during argument
//! validation.

use std::process::Command;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_fetchcache"))
        .args(args)
        .env_remove("FETCHCACHE_TOKEN")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute fetchcache")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("fetchcache"), "Help should mention fetchcache");
    for subcommand in ["get", "batch", "post", "watch", "login", "logout"] {
        assert!(
            stdout.contains(subcommand),
            "Help should mention the {} subcommand",
            subcommand
        );
    }
}

#[test]
fn test_missing_subcommand_fails() {
    let output = run_cli(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_invalid_log_level_prints_error_and_exits() {
    let output = run_cli(&["--log-level", "loud", "get", "/api/x"]);
    assert!(!output.status.success(), "Expected invalid log level to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid log level"),
        "Should print error message about the log level: {}",
        stderr
    );
}

#[test]
fn test_batch_without_endpoints_fails() {
    let output = run_cli(&["batch"]);
    assert!(!output.status.success());
}

#[test]
fn test_post_with_invalid_json_fails() {
    let output = run_cli(&["post", "/api/items", "{not json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid JSON body"),
        "Should report the bad body: {}",
        stderr
    );
}

#[test]
fn test_watch_with_zero_interval_fails() {
    let output = run_cli(&["watch", "/api/x", "--interval-secs", "0"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Interval"), "unexpected stderr: {}", stderr);
}

#[test]
fn test_get_help_lists_repeat_flag() {
    let output = run_cli(&["get", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--repeat"));
}
