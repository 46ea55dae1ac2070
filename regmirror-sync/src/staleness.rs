//! Staleness decision engine.
//!
//! Each entry carries the time of its last remote comparison. Within the
//! staleness interval the previous outcome is reused verbatim and no registry
//! is contacted; past it, both digests are fetched again and the status is
//! recomputed.

use std::time::Duration;

use chrono::Utc;

use regmirror_core::{CatalogEntry, ComparisonResult, Status};

use crate::registry::RegistryClient;

/// Result of evaluating one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub result: ComparisonResult,
    /// `true` when the registries were queried, `false` for a cache hit.
    pub queried: bool,
}

/// Interval that applies to `entry`: its own override, else `default_interval`.
pub fn effective_interval(entry: &CatalogEntry, default_interval: u64) -> i64 {
    let secs = entry.interval.unwrap_or(default_interval);
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Whether `entry` must be compared against the registries at `now`.
///
/// Entries never evaluated before always need a check.
pub fn needs_check(entry: &CatalogEntry, now: i64, default_interval: u64) -> bool {
    if entry.status.is_none() {
        return true;
    }
    now.saturating_sub(entry.last_check) > effective_interval(entry, default_interval)
}

/// Decide and compute the comparison result for `entry` at `now`.
pub fn evaluate<C: RegistryClient + ?Sized>(
    client: &C,
    entry: &CatalogEntry,
    now: i64,
    default_interval: u64,
) -> Evaluation {
    if !needs_check(entry, now, default_interval) {
        if let Some(result) = entry.to_result() {
            tracing::debug!(
                "cached {} ({}, checked {} ago)",
                entry.identity,
                result.status,
                format_seconds(now.saturating_sub(entry.last_check))
            );
            return Evaluation {
                result,
                queried: false,
            };
        }
    }

    let source_reference = entry.source_reference();
    let source = lookup(client, &source_reference);
    let destination = lookup(client, &entry.destination_reference);
    let status = Status::classify(source.as_deref(), destination.as_deref());

    tracing::info!("checked {}: {status}", entry.identity);
    Evaluation {
        result: ComparisonResult {
            source_full_artifact_reference: source_reference,
            destination_full_artifact_reference: entry.destination_reference.clone(),
            source_hash: source.unwrap_or_default(),
            destination_hash: destination.unwrap_or_default(),
            status,
            last_check: now,
            last_update: entry.last_update,
        },
        queried: true,
    }
}

fn lookup<C: RegistryClient + ?Sized>(client: &C, reference: &str) -> Option<String> {
    match client.manifest_digest(reference) {
        Ok(digest) => Some(digest.into_string()),
        Err(err) => {
            tracing::warn!("manifest lookup failed for {reference}: {err}");
            None
        }
    }
}

/// Current time as epoch seconds.
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

/// Compact age of an epoch-second timestamp relative to `now`, e.g. `5m`.
/// `never` for timestamps at or below zero.
pub fn format_age(timestamp: i64, now: i64) -> String {
    if timestamp <= 0 {
        return "never".to_string();
    }
    format_seconds(now.saturating_sub(timestamp))
}

/// Compact rendering of a duration.
pub fn format_duration(duration: Duration) -> String {
    format_seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
}

fn format_seconds(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{digest, FakeRegistry};
    use regmirror_core::ImageIdentity;
    use rstest::rstest;

    const HOST: &str = "mirror.example.com";
    const INTERVAL: u64 = 3600;
    const T: i64 = 1_700_000_000;

    fn entry() -> CatalogEntry {
        CatalogEntry::new(
            ImageIdentity::new("docker.io", "library", "nginx", "latest"),
            HOST,
        )
    }

    fn checked_entry(status: Status, last_check: i64) -> CatalogEntry {
        let mut entry = entry();
        entry.status = Some(status);
        entry.last_check = last_check;
        entry.last_update = last_check - 10;
        entry.source_hash = digest('a');
        entry.destination_hash = digest('a');
        entry
    }

    #[test]
    fn within_interval_reuses_prior_without_queries() {
        let registry = FakeRegistry::default();
        let entry = checked_entry(Status::Ok, T);
        let interval = INTERVAL as i64;

        let eval = evaluate(&registry, &entry, T + interval - 1, INTERVAL);
        assert!(!eval.queried);
        assert_eq!(registry.digest_calls(), 0);
        assert_eq!(Some(eval.result), entry.to_result());
    }

    #[test]
    fn past_interval_queries_both_registries() {
        let registry = FakeRegistry::default();
        let entry = checked_entry(Status::Ok, T);
        registry.set_digest(&entry.source_reference(), digest('a'));
        registry.set_digest(&entry.destination_reference, digest('a'));

        let now = T + INTERVAL as i64 + 1;
        let eval = evaluate(&registry, &entry, now, INTERVAL);
        assert!(eval.queried);
        assert_eq!(registry.digest_calls(), 2);
        assert_eq!(eval.result.status, Status::Ok);
        assert_eq!(eval.result.last_check, now);
        assert_eq!(eval.result.last_update, entry.last_update);
    }

    #[test]
    fn exactly_at_interval_is_still_fresh() {
        let registry = FakeRegistry::default();
        let entry = checked_entry(Status::SyncNeeded, T);
        let eval = evaluate(&registry, &entry, T + INTERVAL as i64, INTERVAL);
        assert!(!eval.queried);
        assert_eq!(eval.result.status, Status::SyncNeeded);
    }

    #[test]
    fn never_checked_entry_is_queried_immediately() {
        let registry = FakeRegistry::default();
        let eval = evaluate(&registry, &entry(), 10, INTERVAL);
        assert!(eval.queried);
        assert_eq!(registry.digest_calls(), 2);
    }

    #[test]
    fn per_entry_interval_overrides_global() {
        let registry = FakeRegistry::default();
        let mut entry = checked_entry(Status::Ok, T);
        entry.interval = Some(60);
        let eval = evaluate(&registry, &entry, T + 61, INTERVAL);
        assert!(eval.queried);
    }

    #[rstest]
    #[case(Some('a'), Some('a'), Status::Ok)]
    #[case(Some('a'), Some('b'), Status::SyncNeeded)]
    #[case(None, Some('b'), Status::ErrorRetrievingManifestFromSource)]
    #[case(Some('a'), None, Status::ErrorRetrievingManifestFromDestination)]
    #[case(None, None, Status::ErrorRetrievingManifestFromBoth)]
    fn classification(
        #[case] source: Option<char>,
        #[case] destination: Option<char>,
        #[case] expected: Status,
    ) {
        let registry = FakeRegistry::default();
        let entry = entry();
        if let Some(c) = source {
            registry.set_digest(&entry.source_reference(), digest(c));
        }
        if let Some(c) = destination {
            registry.set_digest(&entry.destination_reference, digest(c));
        }

        let eval = evaluate(&registry, &entry, T, INTERVAL);
        assert_eq!(eval.result.status, expected);
        assert_eq!(eval.result.source_hash, source.map(digest).unwrap_or_default());
        assert_eq!(
            eval.result.destination_hash,
            destination.map(digest).unwrap_or_default()
        );
    }

    #[test]
    fn age_formatting_is_compact() {
        assert_eq!(format_age(0, T), "never");
        assert_eq!(format_age(T, T), "0s");
        assert_eq!(format_age(T - 65, T), "1m");
        assert_eq!(format_age(T - 3 * 3600, T), "3h");
        assert_eq!(format_duration(Duration::from_secs(2 * 86_400)), "2d");
    }
}
