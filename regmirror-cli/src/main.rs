//! regmirror — incremental container registry mirroring.
//!
//! # Usage
//!
//! ```text
//! regmirror [--env-file PATH] [-v...] run [--dry-run] [--skip-orphans] [--json]
//! regmirror status [--json] [--failing]
//! regmirror catalog [--json]
//! regmirror orphans [--json]
//! regmirror unlock
//! ```

mod commands;
mod exit_codes;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;

use commands::{
    catalog::CatalogArgs, orphans::OrphansArgs, run::RunArgs, status::StatusArgs,
    unlock::UnlockArgs,
};
use regmirror_core::Settings;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "regmirror",
    version,
    about = "Keep a destination registry in step with a declared image catalog",
    long_about = None,
)]
struct Cli {
    /// Read settings from this file instead of `./.env`.
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the destination registry with the catalog.
    Run(RunArgs),

    /// Show the last known state of every artifact.
    Status(StatusArgs),

    /// List the deduplicated catalog.
    Catalog(CatalogArgs),

    /// List destination artifacts that no catalog entry declares.
    Orphans(OrphansArgs),

    /// Remove a run lock left behind by a crashed run.
    Unlock(UnlockArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(exit_codes::classify(&err))
        }
    }
}

fn dispatch(cli: Cli) -> Result<u8> {
    let settings =
        Settings::load(cli.env_file.as_deref()).context("failed to load configuration")?;
    init_tracing(settings.debug_level.max(cli.verbose));
    tracing::debug!("settings: {settings:?}");

    match cli.command {
        Commands::Run(args) => args.run(settings),
        Commands::Status(args) => args.run(&settings),
        Commands::Catalog(args) => args.run(&settings),
        Commands::Orphans(args) => args.run(&settings),
        Commands::Unlock(args) => args.run(&settings),
    }
}

/// Logs go to stderr so `--json` output stays parseable. `RUST_LOG` wins over
/// the configured level.
fn init_tracing(level: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = match level {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
