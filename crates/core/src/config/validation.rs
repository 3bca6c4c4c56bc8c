//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the GitHub owner, repository or file
    /// path is empty, and `ConfigError::Invalid` if:
    /// - `fetch_interval_secs` is 0
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `user_agent` is empty
    /// - only one of `github.auth_user` / `github.auth_token` is set
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("github.owner", &self.github.owner),
            ("github.repo", &self.github.repo),
            ("github.file_path", &self.github.file_path),
        ] {
            if value.trim().is_empty() {
                let env = format!("CATALOGUE_SERVER_{}", field.replace('.', "__").to_uppercase());
                return Err(ConfigError::Missing { field: field.into(), hint: format!("Set {env} environment variable") });
            }
        }

        if self.fetch_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch_interval_secs".into(),
                reason: "must be at least 1 second".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 52_428_800 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        let has_user = self.github.auth_user.as_deref().is_some_and(|s| !s.is_empty());
        let has_token = self.github.auth_token.as_deref().is_some_and(|s| !s.is_empty());
        if has_user != has_token {
            return Err(ConfigError::Invalid {
                field: "github.auth_user".into(),
                reason: "provide both GitHub user and token for authorization, or neither for anonymous access"
                    .into(),
            });
        }

        Ok(())
    }
}
