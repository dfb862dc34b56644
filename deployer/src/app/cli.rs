//! Command-line interface

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::logs::LogLevel;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

/// Build, ship, activate and verify fleet services.
#[derive(Debug, Parser)]
#[command(name = "deploy", version, long_version = LONG_VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Service to deploy, or `all` for the whole fleet in dependency order
    pub target: Option<String>,

    /// Show the activation status of every service
    #[arg(long, conflicts_with = "target")]
    pub status: bool,

    /// Health verification bound in seconds, overriding the per-backend default
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print what would be done without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Root of the source tree services are built from
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub source_root: std::path::PathBuf,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, value_name = "LEVEL", value_enum, ignore_case = true)]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show recent deployment ledger entries
    History(HistoryArgs),

    /// Append one deployment ledger entry
    #[command(disable_version_flag = true)]
    Record(RecordArgs),
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Only show entries for this service
    pub service: Option<String>,

    /// Show at most the N most recent entries
    #[arg(long, value_name = "N")]
    pub last: Option<usize>,
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Service that was deployed
    pub service: String,

    /// Commit that is now live
    #[arg(long)]
    pub commit: String,

    /// Commit that was live before (defaults to the last recorded one)
    #[arg(long)]
    pub previous_commit: Option<String>,

    /// Who deployed (defaults to the configured operator)
    #[arg(long)]
    pub deployed_by: Option<String>,

    /// Version label (defaults to the latest tag)
    #[arg(long)]
    pub version: Option<String>,

    /// Changelog text (defaults to the commit log since the previous commit)
    #[arg(long)]
    pub changes: Option<String>,

    /// Comma-separated cross-reference ids
    #[arg(long, value_delimiter = ',')]
    pub shard_ids: Vec<String>,

    /// Send a deployment notification
    #[arg(
        long,
        action = ArgAction::Set,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        require_equals = true
    )]
    pub notify: bool,
}
