//! Config subcommand handlers.

use firestate_config::{Config, save_config_to};

use super::{load_config, resolve_config_path};
use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output::print_line;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = load_config(global)?;
            // Validate before printing so a bad URL surfaces here too.
            cfg.to_cache_config()?;
            print_line(toml::to_string_pretty(&cfg)?.trim_end());
            Ok(())
        }
        ConfigCommand::Path => {
            print_line(&resolve_config_path(global).display().to_string());
            Ok(())
        }
        ConfigCommand::Init { force } => {
            let path = resolve_config_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists { path });
            }
            save_config_to(&Config::default(), &path)?;
            print_line(&format!("Wrote {}", path.display()));
            Ok(())
        }
    }
}
