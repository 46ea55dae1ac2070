//! `regmirror run` — one full reconciliation.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tokio::task::JoinError;

use regmirror_core::{Settings, Status};
use regmirror_sync::{
    staleness::{format_duration, now_epoch},
    RunLock, RunOptions, RunReport, SyncError, SyncOutcome, ToolRegistryClient,
};

use crate::commands::status::status_indicator;
use crate::exit_codes;

/// Arguments for `regmirror run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Compare digests but do not mirror or write the state database.
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the destination orphan scan.
    #[arg(long)]
    pub skip_orphans: bool,

    /// Emit the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

enum Completion {
    Finished(Result<Result<RunReport, SyncError>, JoinError>),
    Interrupted,
}

impl RunArgs {
    pub fn run(self, settings: Settings) -> Result<u8> {
        let options = RunOptions {
            dry_run: self.dry_run,
            detect_orphans: !self.skip_orphans,
        };
        let started = now_epoch();
        let lock_path = settings.lock_path.clone();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;

        let completion = runtime.block_on(async move {
            let mut engine = tokio::task::spawn_blocking(move || {
                let client = ToolRegistryClient::from_settings(&settings);
                regmirror_sync::run_at(&settings, &client, options, started)
            });
            tokio::select! {
                joined = &mut engine => Completion::Finished(joined),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => Completion::Interrupted,
                    Err(err) => {
                        tracing::warn!("cannot listen for ctrl-c: {err}");
                        Completion::Finished(engine.await)
                    }
                },
            }
        });

        let joined = match completion {
            Completion::Finished(joined) => joined,
            Completion::Interrupted => {
                // The engine thread is abandoned mid-run; nothing is persisted.
                runtime.shutdown_background();
                release_if_ours(&lock_path, started);
                eprintln!(
                    "{} run interrupted; state database not updated",
                    "warning:".yellow().bold()
                );
                return Ok(exit_codes::INTERRUPTED);
            }
        };
        let report = joined.context("reconciliation task failed")??;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize run report")?
            );
        } else {
            print_report(&report);
        }

        if let Some(err) = &report.persist_error {
            eprintln!("{} state database not saved: {err}", "error:".red().bold());
            return Ok(exit_codes::IO_ERROR);
        }
        Ok(exit_codes::SUCCESS)
    }
}

/// Remove the lock only if it still carries this run's timestamp.
fn release_if_ours(path: &Path, started: i64) {
    if RunLock::read_timestamp(path) != Some(started) {
        tracing::debug!("lock at {} is not ours; leaving it", path.display());
        return;
    }
    if let Err(err) = RunLock::force_release(path) {
        eprintln!(
            "{} could not remove {}: {err}; run `regmirror unlock`",
            "warning:".yellow().bold(),
            path.display()
        );
    }
}

fn print_report(report: &RunReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}regmirror v{} | {} entries | {} checked | {} cached",
        env!("CARGO_PKG_VERSION"),
        report.entries,
        report.queried,
        report.cached,
    );
    if report.duplicates > 0 || report.skipped_catalogs > 0 {
        println!(
            "{} {} duplicate declaration(s), {} unreadable catalog file(s)",
            "note:".bright_black(),
            report.duplicates,
            report.skipped_catalogs
        );
    }

    let counts: Vec<String> = Status::ALL
        .iter()
        .map(|&status| format!("{} {status} {}", status_indicator(status), report.count(status)))
        .collect();
    println!("{}", counts.join("  "));

    for outcome in &report.outcomes {
        match outcome {
            SyncOutcome::Synced { source } => println!("  {}  {source}", "✓".green()),
            SyncOutcome::WouldSync { source, status } => {
                println!("  {}  {source} ({status})", "~".yellow())
            }
            SyncOutcome::Failed {
                source, diagnostic, ..
            } => {
                println!("  {}  {source}", "✗".red());
                for line in diagnostic.lines().filter(|l| !l.trim().is_empty()) {
                    println!("       {}", line.bright_black());
                }
            }
        }
    }

    if let Some(orphans) = &report.orphans {
        if !orphans.orphans.is_empty() {
            println!(
                "{} artifact(s) on the destination are not in the catalog:",
                orphans.orphans.len()
            );
            for reference in &orphans.orphans {
                println!("  {}  {reference}", "?".magenta());
            }
        }
        if !orphans.is_complete() {
            println!(
                "{} orphan scan incomplete ({} listing(s) failed)",
                "note:".bright_black(),
                orphans.failures.len()
            );
        }
    }

    let elapsed = u64::try_from(report.finished_at - report.started_at).unwrap_or(0);
    if report.persisted {
        println!(
            "{} state saved (finished in {})",
            "✓".green(),
            format_duration(Duration::from_secs(elapsed))
        );
    } else {
        println!("finished in {}", format_duration(Duration::from_secs(elapsed)));
    }
}
