//! `regmirror catalog` — the deduplicated working set a run would use.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use regmirror_core::Settings;
use regmirror_sync::load_catalog;

use crate::exit_codes;

/// Arguments for `regmirror catalog`.
#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct CatalogEntryJson {
    source: String,
    destination: String,
    registry: String,
    namespace: String,
    image: String,
    tag: String,
    interval: u64,
}

#[derive(Tabled)]
struct CatalogTableRow {
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "destination")]
    destination: String,
    #[tabled(rename = "interval")]
    interval: String,
}

impl CatalogArgs {
    pub fn run(self, settings: &Settings) -> Result<u8> {
        let (catalog, source) = load_catalog(settings).with_context(|| {
            format!(
                "failed to load catalog from {}",
                settings.catalog_dir.display()
            )
        })?;

        if self.json {
            let entries: Vec<CatalogEntryJson> = catalog
                .entries()
                .iter()
                .map(|entry| CatalogEntryJson {
                    source: entry.source_reference(),
                    destination: entry.destination_reference.clone(),
                    registry: entry.identity.registry.clone(),
                    namespace: entry.identity.namespace.clone(),
                    image: entry.identity.image_name.clone(),
                    tag: entry.identity.tag.clone(),
                    interval: entry.interval.unwrap_or(settings.sync_interval),
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("failed to serialize catalog")?
            );
            return Ok(exit_codes::SUCCESS);
        }

        println!(
            "{} entries from {} file(s) in {}",
            catalog.len(),
            source.files.len(),
            settings.catalog_dir.display()
        );
        for skipped in &source.skipped {
            println!("{} skipped {}", "warning:".yellow().bold(), skipped.display());
        }
        for duplicate in catalog.duplicates() {
            println!("{} duplicate {duplicate}", "note:".bright_black());
        }
        if catalog.is_empty() {
            return Ok(exit_codes::SUCCESS);
        }

        let rows: Vec<CatalogTableRow> = catalog
            .entries()
            .iter()
            .map(|entry| CatalogTableRow {
                source: entry.source_reference(),
                destination: entry.destination_reference.clone(),
                interval: match entry.interval {
                    Some(secs) => format!("{secs}s"),
                    None => format!("{}s (default)", settings.sync_interval),
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(exit_codes::SUCCESS)
    }
}
