//! Client configuration loading
//!
//! Each setting is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing default config file is not an error; a malformed one is.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming the backend base URL
pub const ENV_BASE_URL: &str = "TZPC_BASE_URL";
/// Environment variable holding the session cookie (`name=value`)
pub const ENV_SESSION: &str = "TZPC_SESSION";
/// Environment variable pointing at an alternative config file
pub const ENV_CONFIG: &str = "TZPC_CONFIG";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_LOGIN_PATH: &str = "/login";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 600;

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Backend base URL, e.g. `https://review.example.org`
    #[serde(default)]
    pub base_url: Option<String>,

    /// Session cookie sent with every request (`session=...`)
    #[serde(default)]
    pub session_cookie: Option<String>,

    /// Path of the login page, joined to `base_url` for redirects
    #[serde(default)]
    pub login_path: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Delay between status polls in seconds
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,

    /// Upper bound for waiting on one analysis, in seconds
    #[serde(default)]
    pub wait_timeout_secs: Option<u64>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

impl TomlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub session_cookie: Option<String>,
    pub config_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Fully resolved client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL without trailing slash
    pub base_url: String,
    pub session_cookie: Option<String>,
    pub login_path: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_cookie: None,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            wait_timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Resolve configuration from overrides, environment, file and defaults
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let file = match Self::config_file_path(overrides) {
            ConfigFile::Explicit(path) => {
                info!("Loading config from {}", path.display());
                TomlConfig::load(&path)?
            }
            ConfigFile::Default(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                TomlConfig::load(&path)?
            }
            ConfigFile::Default(path) => {
                debug!("No config file at {}, using defaults", path.display());
                TomlConfig::default()
            }
            ConfigFile::None => TomlConfig::default(),
        };

        Self::merge(overrides, &file)
    }

    /// Apply priority order over an already loaded file
    pub fn merge(overrides: &ConfigOverrides, file: &TomlConfig) -> Result<Self> {
        let defaults = Self::default();

        let base_url = overrides
            .base_url
            .clone()
            .or_else(|| env_value(ENV_BASE_URL))
            .or_else(|| file.base_url.clone())
            .unwrap_or(defaults.base_url);

        let session_cookie = overrides
            .session_cookie
            .clone()
            .or_else(|| env_value(ENV_SESSION))
            .or_else(|| file.session_cookie.clone())
            .filter(|c| !c.trim().is_empty());

        let login_path = file.login_path.clone().unwrap_or(defaults.login_path);

        let log_level = overrides
            .log_level
            .clone()
            .or_else(|| file.logging.level.clone())
            .unwrap_or(defaults.log_level);

        let config = Self {
            base_url: normalize_base_url(&base_url)?,
            session_cookie,
            login_path,
            request_timeout: seconds(file.request_timeout_secs, defaults.request_timeout, "request_timeout_secs")?,
            poll_interval: seconds(file.poll_interval_secs, defaults.poll_interval, "poll_interval_secs")?,
            wait_timeout: seconds(file.wait_timeout_secs, defaults.wait_timeout, "wait_timeout_secs")?,
            log_level,
        };

        Ok(config)
    }

    /// Absolute URL of `path` on the backend
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Where an unauthenticated user must be sent
    pub fn login_url(&self) -> String {
        self.url(&self.login_path)
    }

    fn config_file_path(overrides: &ConfigOverrides) -> ConfigFile {
        if let Some(path) = &overrides.config_file {
            return ConfigFile::Explicit(path.clone());
        }
        if let Some(path) = env_value(ENV_CONFIG) {
            return ConfigFile::Explicit(PathBuf::from(path));
        }
        match default_config_path() {
            Some(path) => ConfigFile::Default(path),
            None => ConfigFile::None,
        }
    }
}

enum ConfigFile {
    Explicit(PathBuf),
    Default(PathBuf),
    None,
}

/// Platform config file location: `<config_dir>/tzpc/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tzpc").join("config.toml"))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(Error::Config(format!(
            "base_url must start with http:// or https://, got '{}'",
            raw
        )));
    }
    Ok(trimmed.to_string())
}

fn seconds(value: Option<u64>, default: Duration, name: &str) -> Result<Duration> {
    match value {
        Some(0) => Err(Error::Config(format!("{} must be greater than zero", name))),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}
