//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use checksync_domain::{ChecksyncError, Config, StorageBackend};
use checksync_infra::config;
use tempfile::NamedTempFile;

fn write_with_extension(contents: &str, extension: &str) -> PathBuf {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file.write_all(contents.as_bytes()).expect("Failed to write to temp file");

    let path = temp_file.path().with_extension(extension);
    std::fs::copy(temp_file.path(), &path).expect("Failed to copy file");
    path
}

#[test]
fn test_load_config_from_json_file() {
    let json_content = r#"{
        "queue": { "max_capacity": 250, "default_max_retries": 5 },
        "sync": { "batch_size": 20, "base_delay": 500, "cap_delay": 10000 },
        "network": { "stability_window": 1000 },
        "storage": { "backend": "sqlite", "path": "/tmp/checksync-integration.db" },
        "remote": {
            "base_url": "https://api.example.com",
            "request_timeout": 5000,
            "auth_token": "integration-token"
        },
        "logging": { "level": "debug", "json": true }
    }"#;

    let path = write_with_extension(json_content, "json");
    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(path).ok();

    let config = result.expect("Failed to load config from JSON file");

    assert_eq!(config.queue.max_capacity, 250);
    assert_eq!(config.queue.default_max_retries, 5);
    assert_eq!(config.sync.batch_size, 20);
    assert_eq!(config.sync.base_delay, Duration::from_millis(500));
    assert_eq!(config.sync.cap_delay, Duration::from_secs(10));
    assert_eq!(config.network.stability_window, Duration::from_secs(1));
    assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    assert_eq!(config.storage.path, PathBuf::from("/tmp/checksync-integration.db"));
    assert_eq!(config.remote.base_url, "https://api.example.com");
    assert_eq!(config.remote.request_timeout, Duration::from_secs(5));
    assert_eq!(config.remote.auth_token.as_deref(), Some("integration-token"));
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[test]
fn test_load_config_from_toml_file() {
    let toml_content = r#"
[queue]
max_capacity = 400

[storage]
backend = "json_file"
path = "/tmp/checksync-toml"

[remote]
base_url = "http://127.0.0.1:9000"
"#;

    let path = write_with_extension(toml_content, "toml");
    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(path).ok();

    let config = result.expect("Failed to load config from TOML file");

    assert_eq!(config.queue.max_capacity, 400);
    assert_eq!(config.storage.backend, StorageBackend::JsonFile);
    assert_eq!(config.storage.path, PathBuf::from("/tmp/checksync-toml"));
    assert_eq!(config.remote.base_url, "http://127.0.0.1:9000");

    // Sections not named in the file keep their defaults
    let defaults = Config::default();
    assert_eq!(config.sync, defaults.sync);
    assert_eq!(config.network, defaults.network);
    assert_eq!(config.logging, defaults.logging);
}

#[test]
fn test_load_config_invalid_json() {
    let path = write_with_extension(r#"{ "queue": { "max_capacity": "#, "json");
    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(path).ok();

    let err = result.expect_err("Should fail with invalid JSON");
    assert!(matches!(err, ChecksyncError::Config(ref msg) if msg.contains("JSON")));
}

#[test]
fn test_load_config_unknown_backend_rejected() {
    let path = write_with_extension(r#"{ "storage": { "backend": "postgres" } }"#, "json");
    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(path).ok();

    assert!(matches!(result, Err(ChecksyncError::Config(_))));
}

#[test]
fn test_load_config_missing_explicit_path() {
    let result = config::load_from_file(Some(PathBuf::from("/definitely/not/here/checksync.toml")));

    let err = result.expect_err("Should fail for a missing file");
    assert!(matches!(err, ChecksyncError::Config(ref msg) if msg.contains("not found")));
}

#[test]
fn test_file_values_survive_validation_roundtrip() {
    let config = Config::default();
    let json = serde_json::to_string_pretty(&config).expect("serialize default config");

    let path = write_with_extension(&json, "json");
    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(path).ok();

    let loaded = result.expect("Default config should load back");
    assert_eq!(loaded, config);
    loaded.validate().expect("Default config should validate");
}
