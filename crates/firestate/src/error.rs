//! CLI error types with miette diagnostics.
//!
//! Maps `DataError` and `ConfigError` into user-facing errors with
//! actionable help text.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use firestate_config::ConfigError;
use firestate_core::DataError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Data ─────────────────────────────────────────────────────────
    #[error("Permission denied at {path}")]
    #[diagnostic(
        code(firestate::permission_denied),
        help("The location is covered by a --deny rule.")
    )]
    PermissionDenied { path: String },

    #[error("{0}")]
    #[diagnostic(code(firestate::data))]
    Data(DataError),

    // ── Input ────────────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(firestate::validation))]
    Validation { field: String, reason: String },

    #[error("Seed file not found: {}", path.display())]
    #[diagnostic(
        code(firestate::seed_not_found),
        help("Pass --seed with a JSON file, or set `seed` in the config file.")
    )]
    SeedNotFound { path: PathBuf },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists: {}", path.display())]
    #[diagnostic(
        code(firestate::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: PathBuf },

    #[error(transparent)]
    #[diagnostic(
        code(firestate::config),
        help("Check the config file and FIRESTATE_* environment variables.")
    )]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(firestate::json), help("Check the JSON contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(firestate::toml))]
    Toml(#[from] toml::ser::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(Box::new(err))
    }
}

impl From<DataError> for CliError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::PermissionDenied { path } => Self::PermissionDenied { path },
            other => Self::Data(other),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::Data(
                DataError::Transport { .. } | DataError::Load { .. } | DataError::Disconnected,
            ) => {
                exit_code::CONNECTION
            }
            Self::Validation { .. } => exit_code::USAGE,
            Self::SeedNotFound { .. } => exit_code::NOT_FOUND,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            _ => exit_code::GENERAL,
        }
    }
}
