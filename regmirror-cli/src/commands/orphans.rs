//! `regmirror orphans` — destination artifacts missing from the catalog.
//!
//! Read-only: runs without the lock and never writes state.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use regmirror_core::Settings;
use regmirror_sync::{find_orphans, load_catalog, ToolRegistryClient};

use crate::exit_codes;

/// Arguments for `regmirror orphans`.
#[derive(Args, Debug)]
pub struct OrphansArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl OrphansArgs {
    pub fn run(self, settings: &Settings) -> Result<u8> {
        let (catalog, _) = load_catalog(settings).with_context(|| {
            format!(
                "failed to load catalog from {}",
                settings.catalog_dir.display()
            )
        })?;
        let client = ToolRegistryClient::from_settings(settings);
        let report = find_orphans(&client, &settings.destination_host, &catalog);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize orphans")?
            );
            return Ok(exit_codes::SUCCESS);
        }

        println!(
            "{} orphan(s) among {} artifact(s) on {}",
            report.orphans.len(),
            report.scanned,
            settings.destination_host
        );
        for reference in &report.orphans {
            println!("  {}  {reference}", "?".magenta());
        }
        for (target, diagnostic) in &report.failures {
            println!(
                "{} could not list {target}: {}",
                "warning:".yellow().bold(),
                diagnostic.lines().next().unwrap_or_default()
            );
        }
        Ok(exit_codes::SUCCESS)
    }
}
