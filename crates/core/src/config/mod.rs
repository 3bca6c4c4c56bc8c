//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CATALOGUE_SERVER_*)
//! 2. TOML config file (if CATALOGUE_SERVER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::store::{DEFAULT_CONTENT_FILE, DEFAULT_METADATA_FILE};
use crate::serving::DEFAULT_MAX_AGE_SECS;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CATALOGUE_SERVER_*), nested keys split on `__`
/// 2. TOML config file (if CATALOGUE_SERVER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory holding the catalogue copy and its metadata.
    ///
    /// Set via CATALOGUE_SERVER_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default = "default_content_file")]
    pub content_file: String,

    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,

    /// Seconds between update cycles.
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,

    /// `max-age` advertised to HTTP clients.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Upstream request timeout in milliseconds.
    ///
    /// Set via CATALOGUE_SERVER_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Largest catalogue body accepted from upstream, in bytes.
    ///
    /// Set via CATALOGUE_SERVER_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// User-Agent string for upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Location of the catalogue on GitHub.
    #[serde(default)]
    pub github: GitHubSettings,
}

/// Where the catalogue lives on GitHub and how to authenticate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSettings {
    /// Repository owner (user or organisation).
    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    pub repo: String,

    /// Path of the catalogue file inside the repository.
    #[serde(default)]
    pub file_path: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Host serving raw file contents.
    #[serde(default = "default_raw_host")]
    pub raw_host: String,

    /// Host serving the REST API.
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// GitHub user name for authenticated requests.
    ///
    /// Set via CATALOGUE_SERVER_GITHUB__AUTH_USER. Must be set together with
    /// `auth_token`, or not at all.
    #[serde(default)]
    pub auth_user: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".into()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/cache")
}

fn default_content_file() -> String {
    DEFAULT_CONTENT_FILE.into()
}

fn default_metadata_file() -> String {
    DEFAULT_METADATA_FILE.into()
}

fn default_fetch_interval_secs() -> u64 {
    10
}

fn default_max_age_secs() -> u64 {
    DEFAULT_MAX_AGE_SECS
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_user_agent() -> String {
    "catalogue-server/0.1".into()
}

fn default_branch() -> String {
    "master".into()
}

fn default_raw_host() -> String {
    "raw.githubusercontent.com".into()
}

fn default_api_host() -> String {
    "api.github.com".into()
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            file_path: String::new(),
            branch: default_branch(),
            raw_host: default_raw_host(),
            api_host: default_api_host(),
            auth_user: None,
            auth_token: None,
        }
    }
}

impl GitHubSettings {
    /// Token to authenticate with, when both user and token are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let user = self.auth_user.as_deref().filter(|s| !s.is_empty())?;
        let token = self.auth_token.as_deref().filter(|s| !s.is_empty())?;
        Some((user, token))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cache_dir: default_cache_dir(),
            content_file: default_content_file(),
            metadata_file: default_metadata_file(),
            fetch_interval_secs: default_fetch_interval_secs(),
            max_age_secs: default_max_age_secs(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            user_agent: default_user_agent(),
            github: GitHubSettings::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Interval between update cycles.
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CATALOGUE_SERVER_`
    /// 2. TOML file from `CATALOGUE_SERVER_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CATALOGUE_SERVER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CATALOGUE_SERVER_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
