//! `watch`: bind to a location, drive the in-memory database through a
//! scripted sequence, and print the binding's state after every step.

use std::sync::Arc;

use serde_json::Value;

use firestate_core::{DataError, MemoryAuth};

use super::{build_query, live_data, load_config, open_database, parse_json};
use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output::print_state;

pub fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config(global)?;
    let query = build_query(&args.query)?;
    let writes = args
        .set
        .iter()
        .map(String::as_str)
        .map(parse_write)
        .collect::<Result<Vec<_>, _>>()?;

    let db = Arc::new(open_database(&args.database, &cfg)?);
    let live = live_data(&cfg, Arc::new(MemoryAuth::new()), Arc::clone(&db))?;

    let binding = live.database(query.clone());
    print_state("attach", &binding.state())?;

    db.flush();
    print_state("flush", &binding.state())?;

    for (path, value) in writes {
        db.set(&path, value);
        print_state("set", &binding.state())?;
    }

    if let Some(message) = args.fail {
        db.fail(query.path(), &DataError::transport(message));
        let failed = binding.state();
        print_state("fail", &failed)?;

        if args.retry {
            if let Some(retry) = failed.retry() {
                retry.invoke();
            }
            print_state("retry", &binding.state())?;
            db.flush();
            print_state("flush", &binding.state())?;
        }
    }

    // A run that ends failed reports the error through the exit code.
    let last = binding.state();
    match last.error() {
        Some(error) if !last.loading() => Err(error.clone().into()),
        _ => Ok(()),
    }
}

/// Split `PATH=JSON`.
fn parse_write(raw: &str) -> Result<(String, Value), CliError> {
    let Some((path, value)) = raw.split_once('=') else {
        return Err(CliError::Validation {
            field: "set".into(),
            reason: format!("expected PATH=JSON, got '{raw}'"),
        });
    };
    Ok((path.trim().to_owned(), parse_json("set", value.trim())?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_write_splits_on_first_equals() {
        let (path, value) = parse_write("rooms/a/topic=\"a=b\"").unwrap();
        assert_eq!(path, "rooms/a/topic");
        assert_eq!(value, json!("a=b"));
    }

    #[test]
    fn parse_write_requires_equals() {
        let err = parse_write("rooms/a").unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }
}
