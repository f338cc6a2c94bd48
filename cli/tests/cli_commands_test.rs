// Integration tests for CLI commands
// Run with: cargo test --test cli_commands_test

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the binary against an isolated config directory.
fn run(config_dir: &Path, args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tms-realtime"));
    cmd.args(args)
        .env("TMS_CONFIG_DIR", config_dir)
        .env("RUST_LOG", "off")
        .env_remove("TMS_TOKEN")
        .env_remove("TMS_API_URL")
        .env_remove("TMS_ENV");
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.output().expect("Failed to execute tms-realtime")
}

/// Test that `config` prints the effective configuration as JSON
#[test]
fn test_config_command_prints_json() {
    let temp_dir = TempDir::new().unwrap();

    let output = run(
        temp_dir.path(),
        &["config"],
        &[("TMS_API_URL", "https://tms.example.com")],
    );

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let config: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(config["api_url"], "https://tms.example.com");
    assert!(config.get("token").is_none(), "Token must never be printed");
}

/// Test that `auth set-token` writes credentials.json and `auth clear` empties it
#[test]
fn test_auth_token_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let creds = temp_dir.path().join("credentials.json");

    let output = run(temp_dir.path(), &["auth", "set-token", "tok_123"], &[]);
    assert!(output.status.success(), "set-token should succeed");
    let contents = std::fs::read_to_string(&creds).unwrap();
    assert!(contents.contains("tok_123"), "Credentials should hold the token");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&creds).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600, "Credentials should be owner-only");
    }

    let output = run(temp_dir.path(), &["auth", "clear"], &[]);
    assert!(output.status.success(), "clear should succeed");
    let contents = std::fs::read_to_string(&creds).unwrap();
    assert!(!contents.contains("tok_123"), "Token should be removed");
}

/// Test that `auth status` without a token says so instead of calling the API
#[test]
fn test_auth_status_without_token() {
    let temp_dir = TempDir::new().unwrap();

    let output = run(temp_dir.path(), &["auth", "status"], &[]);

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No token configured."));
}

/// Test that `notifications status` reports a fresh install as disabled
#[test]
fn test_notifications_status_defaults_to_disabled() {
    let temp_dir = TempDir::new().unwrap();

    let output = run(temp_dir.path(), &["notifications", "status"], &[]);

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("permission: default"));
    assert!(stdout.contains("enabled:    false"));
}

/// Test that `listen` refuses to start without a token
#[test]
fn test_listen_without_token_fails() {
    let temp_dir = TempDir::new().unwrap();

    let output = run(temp_dir.path(), &["listen"], &[]);

    assert!(!output.status.success(), "Command should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No API token"));
}
