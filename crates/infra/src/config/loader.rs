//! Configuration loader
//!
//! Loads engine configuration from a file and environment variables.
//!
//! ## Loading Strategy
//! 1. Probe the standard locations for a config file (JSON or TOML)
//! 2. Start from that file, or from defaults when none exists
//! 3. Apply `CHECKSYNC_*` environment overrides on top
//! 4. Validate the result
//!
//! Every config section is optional, so a file only needs the values it
//! changes and any single environment variable can override one field.
//!
//! ## Environment Variables
//! - `CHECKSYNC_QUEUE_MAX_CAPACITY`: Maximum queued actions
//! - `CHECKSYNC_QUEUE_MAX_RETRIES`: Default retry budget per action
//! - `CHECKSYNC_SYNC_BATCH_SIZE`: Actions per sync run
//! - `CHECKSYNC_SYNC_BASE_DELAY_MS`: Backoff base delay in milliseconds
//! - `CHECKSYNC_SYNC_CAP_DELAY_MS`: Backoff cap in milliseconds
//! - `CHECKSYNC_NETWORK_STABILITY_WINDOW_MS`: Connectivity debounce window
//! - `CHECKSYNC_STORAGE_BACKEND`: `json_file` or `sqlite`
//! - `CHECKSYNC_STORAGE_PATH`: Store directory or database file
//! - `CHECKSYNC_REMOTE_BASE_URL`: Checklist API base URL
//! - `CHECKSYNC_REMOTE_TIMEOUT_MS`: Per-request timeout in milliseconds
//! - `CHECKSYNC_REMOTE_AUTH_TOKEN`: Bearer token for the checklist API
//! - `CHECKSYNC_LOG_LEVEL`: Default `EnvFilter` directive
//! - `CHECKSYNC_LOG_JSON`: Emit JSON logs (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `$CHECKSYNC_CONFIG` if set
//! 2. `./checksync.json` or `./checksync.toml` (current working directory)
//! 3. `./config/checksync.json` or `./config/checksync.toml`
//! 4. Next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use checksync_domain::{ChecksyncError, Config, Result, StorageBackend};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "CHECKSYNC_CONFIG";

/// Load configuration from the probed file (if any) plus environment
/// overrides.
///
/// # Errors
/// Returns `ChecksyncError::Config` if the file cannot be parsed, an
/// environment value is malformed, or the merged config fails validation.
pub fn load() -> Result<Config> {
    let base = match probe_config_paths() {
        Some(path) => load_from_file(Some(path))?,
        None => {
            tracing::debug!("No config file found; using defaults");
            Config::default()
        }
    };

    let config = apply_env_overrides(base)?;
    config.validate()?;
    Ok(config)
}

/// Defaults plus environment overrides, without reading any file.
///
/// # Errors
/// Returns `ChecksyncError::Config` if an environment value is malformed or
/// the result fails validation.
pub fn load_from_env() -> Result<Config> {
    let config = apply_env_overrides(Config::default())?;
    config.validate()?;
    tracing::info!("Configuration loaded from environment variables");
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Supports JSON and
/// TOML (detected by file extension).
///
/// # Errors
/// Returns `ChecksyncError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ChecksyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ChecksyncError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ChecksyncError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, by file extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ChecksyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ChecksyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(ChecksyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a config file.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(explicit));
    }

    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend([
            cwd.join("checksync.json"),
            cwd.join("checksync.toml"),
            cwd.join("config/checksync.json"),
            cwd.join("config/checksync.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend([exe_dir.join("checksync.json"), exe_dir.join("checksync.toml")]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Apply every `CHECKSYNC_*` override that is set.
///
/// # Errors
/// Returns `ChecksyncError::Config` naming the first malformed variable.
pub fn apply_env_overrides(mut config: Config) -> Result<Config> {
    if let Some(v) = env_parse::<usize>("CHECKSYNC_QUEUE_MAX_CAPACITY")? {
        config.queue.max_capacity = v;
    }
    if let Some(v) = env_parse::<u32>("CHECKSYNC_QUEUE_MAX_RETRIES")? {
        config.queue.default_max_retries = v;
    }
    if let Some(v) = env_parse::<usize>("CHECKSYNC_SYNC_BATCH_SIZE")? {
        config.sync.batch_size = v;
    }
    if let Some(v) = env_millis("CHECKSYNC_SYNC_BASE_DELAY_MS")? {
        config.sync.base_delay = v;
    }
    if let Some(v) = env_millis("CHECKSYNC_SYNC_CAP_DELAY_MS")? {
        config.sync.cap_delay = v;
    }
    if let Some(v) = env_millis("CHECKSYNC_NETWORK_STABILITY_WINDOW_MS")? {
        config.network.stability_window = v;
    }
    if let Some(v) = env_var("CHECKSYNC_STORAGE_BACKEND") {
        config.storage.backend = parse_backend(&v)?;
    }
    if let Some(v) = env_var("CHECKSYNC_STORAGE_PATH") {
        config.storage.path = PathBuf::from(v);
    }
    if let Some(v) = env_var("CHECKSYNC_REMOTE_BASE_URL") {
        config.remote.base_url = v;
    }
    if let Some(v) = env_millis("CHECKSYNC_REMOTE_TIMEOUT_MS")? {
        config.remote.request_timeout = v;
    }
    if let Some(v) = env_var("CHECKSYNC_REMOTE_AUTH_TOKEN") {
        config.remote.auth_token = Some(v);
    }
    if let Some(v) = env_var("CHECKSYNC_LOG_LEVEL") {
        config.logging.level = v;
    }
    if let Some(v) = env_var("CHECKSYNC_LOG_JSON") {
        config.logging.json = parse_bool(&v);
    }
    Ok(config)
}

fn parse_backend(value: &str) -> Result<StorageBackend> {
    match value.trim().to_ascii_lowercase().as_str() {
        "json" | "json_file" | "file" => Ok(StorageBackend::JsonFile),
        "sqlite" => Ok(StorageBackend::Sqlite),
        other => Err(ChecksyncError::Config(format!(
            "Invalid CHECKSYNC_STORAGE_BACKEND: {other} (expected json_file or sqlite)"
        ))),
    }
}

/// Non-empty environment variable.
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ChecksyncError::Config(format!("Invalid {key}: {e}")))
        })
        .transpose()
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_millis))
}

/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
