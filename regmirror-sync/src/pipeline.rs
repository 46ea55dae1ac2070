//! Run coordinator: the single entrypoint shared by every CLI command that
//! reconciles.
//!
//! Stages run in a fixed order under the run lock:
//!
//! ```text
//! IDLE → LOCK_HELD → CATALOGING → LOADING_STATE → EVALUATING → SYNCING
//!      → PERSISTING → DETECTING_ORPHANS → LOCK_RELEASED
//! ```
//!
//! Only lock contention and an unreadable catalog directory abort a run.
//! Everything after that is per-entry: failures are logged, recorded in the
//! [`RunReport`] and the run moves on.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use regmirror_core::catalog::load_catalog_dir;
use regmirror_core::{Catalog, CatalogSource, ComparisonResult, Settings, Status};

use crate::executor::{self, SyncOutcome};
use crate::lock::RunLock;
use crate::orphans::{find_orphans, OrphanReport};
use crate::pool::map_bounded;
use crate::registry::RegistryClient;
use crate::staleness::{evaluate, now_epoch};
use crate::{state_store, SyncError};

/// Coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStage {
    Idle,
    LockHeld,
    Cataloging,
    LoadingState,
    Evaluating,
    Syncing,
    Persisting,
    DetectingOrphans,
    LockReleased,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStage::Idle => "IDLE",
            RunStage::LockHeld => "LOCK_HELD",
            RunStage::Cataloging => "CATALOGING",
            RunStage::LoadingState => "LOADING_STATE",
            RunStage::Evaluating => "EVALUATING",
            RunStage::Syncing => "SYNCING",
            RunStage::Persisting => "PERSISTING",
            RunStage::DetectingOrphans => "DETECTING_ORPHANS",
            RunStage::LockReleased => "LOCK_RELEASED",
        })
    }
}

/// Knobs for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Evaluate only: no mirror calls, no state write.
    pub dry_run: bool,
    pub detect_orphans: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            detect_orphans: true,
        }
    }
}

/// Everything a run did, for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: i64,
    pub finished_at: i64,
    pub dry_run: bool,
    /// Stages entered, in order.
    pub stages: Vec<RunStage>,
    pub entries: usize,
    pub duplicates: usize,
    pub skipped_catalogs: usize,
    /// Entries whose digests were fetched this run.
    pub queried: usize,
    /// Entries answered from prior state.
    pub cached: usize,
    /// Final status counts, after syncing.
    pub status_counts: BTreeMap<Status, usize>,
    /// Final results in catalog order.
    pub results: Vec<ComparisonResult>,
    pub outcomes: Vec<SyncOutcome>,
    pub orphans: Option<OrphanReport>,
    pub persisted: bool,
    pub persist_error: Option<String>,
}

impl RunReport {
    fn new(started_at: i64, dry_run: bool) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            dry_run,
            stages: vec![RunStage::Idle],
            entries: 0,
            duplicates: 0,
            skipped_catalogs: 0,
            queried: 0,
            cached: 0,
            status_counts: BTreeMap::new(),
            results: Vec::new(),
            outcomes: Vec::new(),
            orphans: None,
            persisted: false,
            persist_error: None,
        }
    }

    fn enter(&mut self, stage: RunStage) {
        tracing::debug!("stage {stage}");
        self.stages.push(stage);
    }

    pub fn synced(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SyncOutcome::Synced { .. }))
            .count()
    }

    pub fn sync_failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn count(&self, status: Status) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }
}

/// Load and deduplicate the catalog described by `settings`.
pub fn load_catalog(settings: &Settings) -> Result<(Catalog, CatalogSource), SyncError> {
    let source = load_catalog_dir(&settings.catalog_dir)?;
    let catalog = Catalog::build(&source.declared, &settings.destination_host);
    Ok((catalog, source))
}

/// Run a full reconciliation now.
pub fn run<C: RegistryClient + ?Sized>(
    settings: &Settings,
    client: &C,
    options: RunOptions,
) -> Result<RunReport, SyncError> {
    run_at(settings, client, options, now_epoch())
}

/// Run a full reconciliation as of `now` (epoch seconds).
///
/// `now` stamps the lock, every fresh `last_check` and every `last_update`.
pub fn run_at<C: RegistryClient + ?Sized>(
    settings: &Settings,
    client: &C,
    options: RunOptions,
    now: i64,
) -> Result<RunReport, SyncError> {
    let mut report = RunReport::new(now, options.dry_run);

    let lock = RunLock::acquire(&settings.lock_path, now)?;
    report.enter(RunStage::LockHeld);

    // Any early return from here drops `lock`, which releases it.
    report.enter(RunStage::Cataloging);
    let (mut catalog, source) = load_catalog(settings)?;
    report.entries = catalog.len();
    report.duplicates = catalog.duplicates().len();
    report.skipped_catalogs = source.skipped.len();
    tracing::info!(
        "catalog: {} entr{} from {} file(s)",
        catalog.len(),
        if catalog.len() == 1 { "y" } else { "ies" },
        source.files.len()
    );

    report.enter(RunStage::LoadingState);
    let prior = state_store::load(&settings.state_path);
    let mut inherited = 0usize;
    for entry in catalog.entries_mut() {
        let Some(record) = prior.get(&entry.source_reference()) else {
            continue;
        };
        if entry.inherit(record) {
            inherited += 1;
        } else {
            tracing::info!(
                "prior state for {} targets {}; re-checking",
                entry.identity,
                record.destination_full_artifact_reference
            );
        }
    }
    tracing::debug!("{inherited} of {} entries have prior state", catalog.len());

    report.enter(RunStage::Evaluating);
    let evaluations = map_bounded(catalog.entries(), settings.workers, |entry| {
        evaluate(client, entry, now, settings.sync_interval)
    });
    let mut results = Vec::with_capacity(evaluations.len());
    for evaluation in evaluations {
        if evaluation.queried {
            report.queried += 1;
        } else {
            report.cached += 1;
        }
        results.push(evaluation.result);
    }

    report.enter(RunStage::Syncing);
    report.outcomes = executor::run(
        client,
        &mut results,
        &settings.destination_host,
        now,
        options.dry_run,
        settings.workers,
    );

    report.enter(RunStage::Persisting);
    if options.dry_run {
        tracing::info!("dry-run: state database left untouched");
    } else {
        match state_store::save(&settings.state_path, &results) {
            Ok(()) => report.persisted = true,
            Err(err) => {
                tracing::error!("failed to persist state: {err}");
                report.persist_error = Some(err.to_string());
            }
        }
    }

    if options.detect_orphans {
        report.enter(RunStage::DetectingOrphans);
        report.orphans = Some(find_orphans(client, &settings.destination_host, &catalog));
    }

    for result in &results {
        *report.status_counts.entry(result.status).or_insert(0) += 1;
    }
    report.results = results;

    if let Err(err) = lock.release() {
        tracing::error!("failed to release lock: {err}");
    }
    report.enter(RunStage::LockReleased);
    report.finished_at = now_epoch().max(now);

    tracing::info!(
        "run finished: {} entries, {} queried, {} cached, {} synced, {} failed",
        report.entries,
        report.queried,
        report.cached,
        report.synced(),
        report.sync_failures()
    );
    Ok(report)
}
