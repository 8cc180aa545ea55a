//! Shared configuration for firestate tools.
//!
//! TOML file + `FIRESTATE_*` environment, translated into
//! `firestate_core::CacheConfig`. The core never reads configuration itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use firestate_core::CacheConfig;
use firestate_core::config::DEFAULT_DATABASE_URL;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config ─────────────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the database; prefixes every database cache key.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// How long an unused cache entry keeps its upstream listener.
    /// `0` releases on the next scheduler tick.
    #[serde(default)]
    pub release_delay_ms: u64,

    /// JSON file loaded into the in-memory database on startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            release_delay_ms: 0,
            seed: None,
        }
    }
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.into()
}

impl Config {
    /// Validate and translate into the core's cache settings.
    pub fn to_cache_config(&self) -> Result<CacheConfig, ConfigError> {
        let url: url::Url = self
            .database_url
            .parse()
            .map_err(|e: url::ParseError| ConfigError::Validation {
                field: "database_url".into(),
                reason: format!("{e}: {}", self.database_url),
            })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation {
                field: "database_url".into(),
                reason: format!("expected an http(s) URL, got scheme '{}'", url.scheme()),
            });
        }

        Ok(CacheConfig::default()
            .with_database_url(self.database_url.as_str())
            .with_release_delay(Duration::from_millis(self.release_delay_ms)))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "firestate", "firestate").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("firestate");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Provider chain: defaults, then the TOML file at `path`, then
/// `FIRESTATE_*` variables.
pub fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FIRESTATE_"))
}

/// Load the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` + environment. A missing file yields the
/// defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment_for(path).extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parent
/// directories.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}
