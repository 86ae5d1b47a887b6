//! Application configuration with layered loading.
//!
//! Sources, highest precedence first:
//!
//! 1. Environment variables (SWCACHE_*)
//! 2. TOML config file (if SWCACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! List-valued fields take TOML array syntax in the environment, e.g.
//! `SWCACHE_STATIC_ASSETS='["/", "/index.html"]'`.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin the engine serves. Requests to any other origin pass through.
    ///
    /// Set via SWCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Semantic version reported over the control channel.
    #[serde(default = "default_engine_version")]
    pub engine_version: String,

    /// Version token embedded in partition names (`static-<cache_version>`).
    ///
    /// Changing it makes the next activation evict every older partition.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Path to the SQLite partition store.
    ///
    /// Set via SWCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Page shell served to offline document requests.
    #[serde(default = "default_shell_path")]
    pub shell_path: String,

    /// Root-relative paths precached all-or-nothing into the static partition.
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,

    /// Root-relative paths precached best-effort into the images partition.
    #[serde(default = "default_image_assets")]
    pub image_assets: Vec<String>,

    /// Upper bound on a single network fetch in milliseconds.
    ///
    /// Unset means no limit: a hanging origin stalls only the request waiting on it.
    #[serde(default)]
    pub fetch_timeout_ms: Option<u64>,

    /// Activate a freshly installed version without waiting for a
    /// `SKIP_WAITING` message.
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_engine_version() -> String {
    "3.0.0".into()
}

fn default_cache_version() -> String {
    "v3.0".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./swcache.sqlite")
}

fn default_user_agent() -> String {
    "swcache/0.1".into()
}

fn default_shell_path() -> String {
    "/index.html".into()
}

fn default_static_assets() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/styles-minimalist.css",
        "/main-browser.js",
        "/modules/gallery-browser.js",
        "/modules/forms-browser.js",
        "/config/libraries.js",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Portfolio artwork; each is published in four renditions.
const PORTFOLIO_IMAGES: &[&str] = &[
    "freepik__subtle-variation-of-the-previous-electronic-music-__38650",
    "freepik__subtle-variation-of-the-previous-electronic-music-__38651",
    "freepik__upload__96336",
    "freepik__upload__96337",
    "freepik__upload__96338",
    "freepik__upload__96339",
    "freepik__upload__96340",
    "freepik__upload__96341",
    "freepik__upload__96342",
    "3d-composition",
];

fn default_image_assets() -> Vec<String> {
    let profiles = ["/assets/images/elizaveta-profile.jpg", "/assets/images/elizaveta-profile_1200w.jpg"];
    let renditions = PORTFOLIO_IMAGES.iter().flat_map(|stem| {
        ["-sm.webp", ".webp", "-sm.jpg", ".jpg"].map(|suffix| format!("/assets/images/portfolio/{stem}{suffix}"))
    });
    profiles.into_iter().map(String::from).chain(renditions).collect()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            engine_version: default_engine_version(),
            cache_version: default_cache_version(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            shell_path: default_shell_path(),
            static_assets: default_static_assets(),
            image_assets: default_image_assets(),
            fetch_timeout_ms: None,
            skip_waiting_on_install: true,
        }
    }
}

impl AppConfig {
    /// Network timeout as a Duration, if one is configured.
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SWCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SWCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
