//! Tests for client configuration resolution
//!
//! Covers the priority order (CLI > environment > TOML file > defaults) and
//! graceful handling of missing or broken config files.
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate TZPC_* variables are marked with #[serial].

use serial_test::serial;
use std::env;
use std::time::Duration;
use tzpc_common::config::{ClientConfig, ConfigOverrides, TomlConfig, ENV_BASE_URL, ENV_CONFIG, ENV_SESSION};
use tzpc_common::Error;

fn clear_env() {
    env::remove_var(ENV_BASE_URL);
    env::remove_var(ENV_SESSION);
    env::remove_var(ENV_CONFIG);
}

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).expect("Failed to write config");
    (dir, path)
}

#[test]
fn test_toml_all_keys_optional() {
    let config = TomlConfig::from_toml_str("").unwrap();
    assert!(config.base_url.is_none());
    assert!(config.logging.level.is_none());
}

#[test]
fn test_toml_full_file() {
    let config = TomlConfig::from_toml_str(
        r#"
        base_url = "https://review.example.org/"
        session_cookie = "session=abc"
        login_path = "/auth/login"
        request_timeout_secs = 10
        poll_interval_secs = 2
        wait_timeout_secs = 120

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.base_url.as_deref(), Some("https://review.example.org/"));
    assert_eq!(config.poll_interval_secs, Some(2));
    assert_eq!(config.logging.level.as_deref(), Some("debug"));
}

#[test]
fn test_toml_malformed_is_config_error() {
    let err = TomlConfig::from_toml_str("base_url = ").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_file_values_applied() {
    clear_env();
    let (_dir, path) = write_config(
        r#"
        base_url = "https://review.example.org/"
        poll_interval_secs = 2
        [logging]
        level = "warn"
        "#,
    );

    let overrides = ConfigOverrides {
        config_file: Some(path),
        ..Default::default()
    };
    let config = ClientConfig::resolve(&overrides).unwrap();

    assert_eq!(config.base_url, "https://review.example.org");
    assert_eq!(config.poll_interval, Duration::from_secs(2));
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert_eq!(config.log_level, "warn");
    assert_eq!(config.login_url(), "https://review.example.org/login");
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let (_dir, path) = write_config(
        r#"
        base_url = "https://from-file.example.org"
        session_cookie = "session=file"
        "#,
    );
    env::set_var(ENV_BASE_URL, "http://from-env:9000");
    env::set_var(ENV_SESSION, "session=env");

    let overrides = ConfigOverrides {
        config_file: Some(path),
        ..Default::default()
    };
    let config = ClientConfig::resolve(&overrides).unwrap();

    assert_eq!(config.base_url, "http://from-env:9000");
    assert_eq!(config.session_cookie.as_deref(), Some("session=env"));

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    env::set_var(ENV_BASE_URL, "http://from-env:9000");

    let file = TomlConfig::default();
    let overrides = ConfigOverrides {
        base_url: Some("http://from-cli:7000/".into()),
        log_level: Some("trace".into()),
        ..Default::default()
    };
    let config = ClientConfig::merge(&overrides, &file).unwrap();

    assert_eq!(config.base_url, "http://from-cli:7000");
    assert_eq!(config.log_level, "trace");

    clear_env();
}

#[test]
#[serial]
fn test_config_path_from_env() {
    clear_env();
    let (_dir, path) = write_config("base_url = \"http://env-file:8100\"");
    env::set_var(ENV_CONFIG, &path);

    let config = ClientConfig::resolve(&ConfigOverrides::default()).unwrap();
    assert_eq!(config.base_url, "http://env-file:8100");

    clear_env();
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let overrides = ConfigOverrides {
        config_file: Some(dir.path().join("absent.toml")),
        ..Default::default()
    };

    let err = ClientConfig::resolve(&overrides).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_blank_session_is_ignored() {
    clear_env();
    env::set_var(ENV_SESSION, "   ");

    let config = ClientConfig::merge(&ConfigOverrides::default(), &TomlConfig::default()).unwrap();
    assert!(config.session_cookie.is_none());
    assert_eq!(config.base_url, "http://127.0.0.1:8000");

    clear_env();
}
