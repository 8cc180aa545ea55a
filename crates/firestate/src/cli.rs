//! Clap derive structures for the `firestate` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// firestate -- watch realtime data as loading / error / data state
#[derive(Debug, Parser)]
#[command(
    name = "firestate",
    version,
    about = "Drive cached realtime subscriptions from the command line",
    long_about = "Runs database and auth bindings against in-memory backends and prints\n\
        every state transition as a JSON line.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "FIRESTATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bind to a database location and print each state transition
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Suspense-read a database location once
    #[command(alias = "r")]
    Read(ReadArgs),

    /// Bind to the auth stream and resolve it
    Auth(AuthArgs),

    /// Inspect or create the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Arguments ─────────────────────────────────────────────────

/// Where the in-memory database comes from and which rules it enforces.
#[derive(Debug, Args)]
pub struct DatabaseArgs {
    /// JSON file loaded as the database root (overrides `seed` in config)
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Deny reads at and below PATH (repeatable)
    #[arg(long, value_name = "PATH")]
    pub deny: Vec<String>,
}

/// Query constraints applied to the watched location.
#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Database path, e.g. `rooms/lobby`
    pub path: String,

    /// Order children by key
    #[arg(long, conflicts_with_all = ["order_by_value", "order_by_child"])]
    pub order_by_key: bool,

    /// Order children by value
    #[arg(long, conflicts_with = "order_by_child")]
    pub order_by_value: bool,

    /// Order children by the named child value
    #[arg(long, value_name = "NAME")]
    pub order_by_child: Option<String>,

    /// Keep the first N children
    #[arg(long, value_name = "N", conflicts_with = "limit_last")]
    pub limit_first: Option<u32>,

    /// Keep the last N children
    #[arg(long, value_name = "N")]
    pub limit_last: Option<u32>,

    /// Lower bound on the ordered value (JSON)
    #[arg(long, value_name = "JSON")]
    pub start_at: Option<String>,

    /// Upper bound on the ordered value (JSON)
    #[arg(long, value_name = "JSON")]
    pub end_at: Option<String>,

    /// Exact match on the ordered value (JSON)
    #[arg(long, value_name = "JSON")]
    pub equal_to: Option<String>,
}

// ── watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Write JSON at PATH after the first value (`PATH=JSON`, repeatable)
    #[arg(long, value_name = "PATH=JSON")]
    pub set: Vec<String>,

    /// Cancel the listener with a transport error
    #[arg(long, value_name = "MESSAGE")]
    pub fail: Option<String>,

    /// Invoke the failure's retry and reload
    #[arg(long, requires = "fail")]
    pub retry: bool,
}

// ── read ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReadArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Pretty-print the value
    #[arg(long)]
    pub pretty: bool,
}

// ── auth ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AuthArgs {
    /// Sign in as UID once the session resolves (signed out if omitted)
    #[arg(long, value_name = "UID")]
    pub user: Option<String>,

    /// Email for the signed-in user
    #[arg(long, requires = "user")]
    pub email: Option<String>,

    /// Sign in anonymously
    #[arg(long, requires = "user")]
    pub anonymous: bool,

    /// Sign out after resolving
    #[arg(long)]
    pub sign_out: bool,
}

// ── config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration as TOML
    Show,

    /// Print the config file location
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
