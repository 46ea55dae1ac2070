//! Sync executor: mirror every result whose status is not `OK`.
//!
//! Success flips the result to `OK`, stamps `last_update` and records the
//! source digest as the destination digest when it is known; failure leaves
//! the result untouched so the entry is retried on a later run. Entries are
//! independent, so a failure never stops the loop.

use serde::Serialize;

use regmirror_core::{ComparisonResult, Status};

use crate::pool::map_bounded;
use crate::registry::RegistryClient;

/// What happened to one non-OK result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Mirror succeeded; the result is now `OK`.
    Synced { source: String },
    /// Mirror failed; `diagnostic` is the captured tool output.
    Failed {
        source: String,
        status: Status,
        diagnostic: String,
    },
    /// Dry-run: a mirror *would* have been attempted.
    WouldSync { source: String, status: Status },
}

impl SyncOutcome {
    pub fn source(&self) -> &str {
        match self {
            SyncOutcome::Synced { source }
            | SyncOutcome::Failed { source, .. }
            | SyncOutcome::WouldSync { source, .. } => source,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }
}

/// Mirror every non-OK entry of `results` in place.
///
/// Mirror calls run on up to `workers` threads; `results` is only updated
/// after all of them have finished. Outcomes follow the order of `results`.
pub fn run<C: RegistryClient + ?Sized>(
    client: &C,
    results: &mut [ComparisonResult],
    destination_host: &str,
    now: i64,
    dry_run: bool,
    workers: usize,
) -> Vec<SyncOutcome> {
    let pending: Vec<(usize, String, Status)> = results
        .iter()
        .enumerate()
        .filter(|(_, result)| !result.status.is_ok())
        .map(|(index, result)| {
            (
                index,
                result.source_full_artifact_reference.clone(),
                result.status,
            )
        })
        .collect();

    if dry_run {
        return pending
            .into_iter()
            .map(|(_, source, status)| {
                tracing::info!("[dry-run] would sync {source} ({status})");
                SyncOutcome::WouldSync { source, status }
            })
            .collect();
    }

    let attempts = map_bounded(&pending, workers, |(_, source, status)| {
        tracing::info!("[{status}] syncing {source}");
        client.mirror_all_platforms(source, destination_host)
    });

    let mut outcomes = Vec::with_capacity(pending.len());
    for ((index, source, status), attempt) in pending.into_iter().zip(attempts) {
        match attempt {
            Ok(()) => {
                let result = &mut results[index];
                result.status = Status::Ok;
                result.last_update = now;
                if !result.source_hash.is_empty() {
                    result.destination_hash = result.source_hash.clone();
                }
                tracing::info!("synced {source}");
                outcomes.push(SyncOutcome::Synced { source });
            }
            Err(err) => {
                let diagnostic = err.diagnostic();
                tracing::error!("sync failed for {source}: {diagnostic}");
                outcomes.push(SyncOutcome::Failed {
                    source,
                    status,
                    diagnostic,
                });
            }
        }
    }
    outcomes
}
