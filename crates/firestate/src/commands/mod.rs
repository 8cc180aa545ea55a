//! Command handlers plus the setup they share: config resolution and the
//! in-memory backends.

pub mod auth;
pub mod config_cmd;
pub mod read;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use firestate_config::{Config, config_path, load_config_from};
use firestate_core::{LiveData, MemoryAuth, MemoryDatabase, Query};

use crate::cli::{DatabaseArgs, GlobalOpts, QueryArgs};
use crate::error::CliError;

/// Config file selected by `--config`, else the platform default.
pub fn resolve_config_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = resolve_config_path(global);
    debug!(path = %path.display(), "loading config");
    Ok(load_config_from(&path)?)
}

/// In-memory database seeded from `--seed` or the config's `seed`, with
/// every `--deny` rule applied.
pub fn open_database(args: &DatabaseArgs, cfg: &Config) -> Result<MemoryDatabase, CliError> {
    let db = match args.seed.as_ref().or(cfg.seed.as_ref()) {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::SeedNotFound { path: path.clone() });
            }
            let raw = std::fs::read_to_string(path)?;
            let root: Value = serde_json::from_str(&raw)?;
            debug!(path = %path.display(), "seeded database");
            MemoryDatabase::from_value(root)
        }
        None => MemoryDatabase::new(),
    };
    for rule in &args.deny {
        db.deny(rule);
    }
    Ok(db)
}

/// Facade over the given backends, configured from `cfg`.
pub fn live_data(
    cfg: &Config,
    auth: Arc<MemoryAuth>,
    db: Arc<MemoryDatabase>,
) -> Result<LiveData, CliError> {
    Ok(LiveData::new(cfg.to_cache_config()?, auth, db))
}

pub fn build_query(args: &QueryArgs) -> Result<Query, CliError> {
    let mut query = Query::new(&args.path);

    if args.order_by_key {
        query = query.order_by_key();
    } else if args.order_by_value {
        query = query.order_by_value();
    } else if let Some(ref child) = args.order_by_child {
        query = query.order_by_child(child.as_str());
    }

    if let Some(n) = args.limit_first {
        query = query.limit_to_first(n);
    } else if let Some(n) = args.limit_last {
        query = query.limit_to_last(n);
    }

    if let Some(ref raw) = args.start_at {
        query = query.start_at(parse_json("start-at", raw)?);
    }
    if let Some(ref raw) = args.end_at {
        query = query.end_at(parse_json("end-at", raw)?);
    }
    if let Some(ref raw) = args.equal_to {
        query = query.equal_to(parse_json("equal-to", raw)?);
    }
    Ok(query)
}

/// Parse a JSON argument. Bare words that are not JSON are taken as
/// strings.
pub fn parse_json(field: &str, raw: &str) -> Result<Value, CliError> {
    match serde_json::from_str(raw) {
        Ok(value) => Ok(value),
        Err(_) if is_bare_word(raw) => Ok(Value::String(raw.to_owned())),
        Err(e) => Err(CliError::Validation {
            field: field.into(),
            reason: format!("not valid JSON ({e}): {raw}"),
        }),
    }
}

fn is_bare_word(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
