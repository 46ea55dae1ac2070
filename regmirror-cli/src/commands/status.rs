//! `regmirror status` — last known state of every tracked artifact.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use regmirror_core::{ComparisonResult, Settings, Status};
use regmirror_sync::staleness::{format_age, now_epoch};
use regmirror_sync::state_store;

use crate::exit_codes;

/// Arguments for `regmirror status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Only show artifacts whose status is not OK.
    #[arg(long)]
    pub failing: bool,
}

impl StatusArgs {
    pub fn run(self, settings: &Settings) -> Result<u8> {
        let db = state_store::load(&settings.state_path);
        let now = now_epoch();

        let mut records: Vec<&ComparisonResult> = db.records().iter().collect();
        records.sort_by(|a, b| {
            a.source_full_artifact_reference
                .cmp(&b.source_full_artifact_reference)
        });
        let counts = count_statuses(&records);
        if self.failing {
            records.retain(|record| !record.status.is_ok());
        }

        if self.json {
            print_json(&records, &counts, now)?;
        } else {
            print_table(settings, &records, &counts, now);
        }
        Ok(exit_codes::SUCCESS)
    }
}

#[derive(Serialize)]
struct StatusReportJson<'a> {
    summary: StatusSummaryJson,
    artifacts: Vec<ArtifactStatusJson<'a>>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    artifacts: usize,
    statuses: BTreeMap<Status, usize>,
}

#[derive(Serialize)]
struct ArtifactStatusJson<'a> {
    source: &'a str,
    destination: &'a str,
    status: Status,
    source_hash: &'a str,
    destination_hash: &'a str,
    last_check: i64,
    last_check_age: String,
    last_update: i64,
    last_update_age: String,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "artifact")]
    artifact: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "checked")]
    checked: String,
    #[tabled(rename = "updated")]
    updated: String,
    #[tabled(rename = "source digest")]
    digest: String,
}

fn count_statuses(records: &[&ComparisonResult]) -> BTreeMap<Status, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.status).or_insert(0) += 1;
    }
    counts
}

fn print_json(
    records: &[&ComparisonResult],
    counts: &BTreeMap<Status, usize>,
    now: i64,
) -> Result<()> {
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            artifacts: counts.values().sum(),
            statuses: counts.clone(),
        },
        artifacts: records
            .iter()
            .map(|record| ArtifactStatusJson {
                source: &record.source_full_artifact_reference,
                destination: &record.destination_full_artifact_reference,
                status: record.status,
                source_hash: &record.source_hash,
                destination_hash: &record.destination_hash,
                last_check: record.last_check,
                last_check_age: format_age(record.last_check, now),
                last_update: record.last_update,
                last_update_age: format_age(record.last_update, now),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(
    settings: &Settings,
    records: &[&ComparisonResult],
    counts: &BTreeMap<Status, usize>,
    now: i64,
) {
    let total: usize = counts.values().sum();
    let failing = total - counts.get(&Status::Ok).copied().unwrap_or(0);
    println!(
        "regmirror v{} | {} | {} artifacts | {} not OK",
        env!("CARGO_PKG_VERSION"),
        settings.destination_host,
        total,
        failing,
    );

    if records.is_empty() {
        if total == 0 {
            println!("No state recorded yet. Run 'regmirror run' first.");
        } else {
            println!("All artifacts are OK.");
        }
        return;
    }

    let rows: Vec<StatusTableRow> = records
        .iter()
        .map(|record| StatusTableRow {
            artifact: record.source_full_artifact_reference.clone(),
            status: status_label(record.status),
            checked: format_age(record.last_check, now),
            updated: format_age(record.last_update, now),
            digest: short_digest(&record.source_hash),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if failing > 0 {
        println!("Run 'regmirror run' to retry artifacts that are not OK.");
    }
}

/// Colored square for a status.
pub(crate) fn status_indicator(status: Status) -> String {
    match status {
        Status::Ok => "■".green().bold().to_string(),
        Status::SyncNeeded => "■".yellow().bold().to_string(),
        Status::ErrorRetrievingManifestFromSource => "■".red().bold().to_string(),
        Status::ErrorRetrievingManifestFromDestination => "■".magenta().bold().to_string(),
        Status::ErrorRetrievingManifestFromBoth => "■".bright_black().bold().to_string(),
    }
}

fn status_label(status: Status) -> String {
    format!("{} {status}", status_indicator(status))
}

/// `sha256:0123456789ab…` → `0123456789ab`; `-` when unknown.
fn short_digest(digest: &str) -> String {
    let encoded = digest.split_once(':').map_or(digest, |(_, hex)| hex);
    if encoded.is_empty() {
        return "-".to_string();
    }
    encoded.chars().take(12).collect()
}
