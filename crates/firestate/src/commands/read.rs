//! `read`: one suspense read through a binding.

use std::sync::Arc;

use firestate_core::MemoryAuth;

use super::{build_query, live_data, load_config, open_database};
use crate::cli::{GlobalOpts, ReadArgs};
use crate::error::CliError;
use crate::output::{print_line, render_json};

pub async fn handle(args: ReadArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config(global)?;
    let query = build_query(&args.query)?;
    let db = Arc::new(open_database(&args.database, &cfg)?);
    let live = live_data(&cfg, Arc::new(MemoryAuth::new()), db)?;

    let binding = live.database(query);
    let value = binding.read_settled().await?;
    print_line(&render_json(&value, args.pretty)?);
    Ok(())
}
