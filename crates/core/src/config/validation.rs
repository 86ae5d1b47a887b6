//! Configuration validation rules.
//!
//! Applied to `AppConfig` after it has been loaded from environment, files,
//! or defaults.

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

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_root_relative(field: &str, path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') || path.starts_with("//") {
        return Err(invalid(field, format!("{path:?} must be a root-relative path")));
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an http(s) URL with a host
    /// - `cache_version` is empty or contains whitespace or `/`
    /// - `engine_version` or `user_agent` is empty
    /// - `shell_path` or any precache path is not root-relative
    /// - `fetch_timeout_ms` is set outside 100ms ..= 5 minutes
    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = url::Url::parse(&self.origin).map_err(|e| invalid("origin", e.to_string()))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(invalid("origin", format!("unsupported scheme: {}", origin.scheme())));
        }
        if origin.host_str().is_none() {
            return Err(invalid("origin", "must include a host"));
        }

        if self.cache_version.is_empty() {
            return Err(ConfigError::Missing {
                field: "cache_version".into(),
                hint: "Set SWCACHE_CACHE_VERSION to the deploy's version token".into(),
            });
        }
        if self.cache_version.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(invalid("cache_version", "must not contain whitespace or '/'"));
        }

        if self.engine_version.is_empty() {
            return Err(invalid("engine_version", "must not be empty"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        check_root_relative("shell_path", &self.shell_path)?;
        for path in &self.static_assets {
            check_root_relative("static_assets", path)?;
        }
        for path in &self.image_assets {
            check_root_relative("image_assets", path)?;
        }

        if let Some(timeout_ms) = self.fetch_timeout_ms {
            if timeout_ms < 100 {
                return Err(invalid("fetch_timeout_ms", "must be at least 100ms"));
            }
            if timeout_ms > 300_000 {
                return Err(invalid("fetch_timeout_ms", "must not exceed 5 minutes (300000ms)"));
            }
        }

        if !self.static_assets.iter().any(|p| p == &self.shell_path) {
            tracing::warn!(
                shell_path = %self.shell_path,
                "shell_path is not in static_assets; offline document requests \
                 only get the shell if it was cached at runtime"
            );
        }

        Ok(())
    }
}
