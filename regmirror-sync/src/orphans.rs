//! Orphan detection: destination artifacts no catalog entry accounts for.
//!
//! Report-only. Nothing is ever deleted from the destination registry.

use std::collections::HashSet;

use serde::Serialize;

use regmirror_core::Catalog;

use crate::registry::RegistryClient;

/// Outcome of one destination scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanReport {
    /// Full destination references (`host/repo:tag`), sorted.
    pub orphans: Vec<String>,
    /// Number of tags inspected across all repositories.
    pub scanned: usize,
    /// Listings that failed (`host` or `host/repo`) with their diagnostic.
    pub failures: Vec<(String, String)>,
}

impl OrphanReport {
    /// `true` when the scan covered the whole destination.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Walk every repository and tag on `destination_host` and collect those
/// whose full reference is not an expected destination of `catalog`.
///
/// Listing failures are logged and skipped; the scan carries on with the
/// remaining repositories.
pub fn find_orphans<C: RegistryClient + ?Sized>(
    client: &C,
    destination_host: &str,
    catalog: &Catalog,
) -> OrphanReport {
    let expected: HashSet<&str> = catalog.destination_references();
    let mut report = OrphanReport::default();

    let repositories = match client.list_repositories(destination_host) {
        Ok(repositories) => repositories,
        Err(err) => {
            tracing::error!("cannot list repositories on {destination_host}: {err}");
            report
                .failures
                .push((destination_host.to_string(), err.diagnostic()));
            return report;
        }
    };

    for repository in repositories {
        let tags = match client.list_tags(destination_host, &repository) {
            Ok(tags) => tags,
            Err(err) => {
                tracing::warn!("cannot list tags of {destination_host}/{repository}: {err}");
                report
                    .failures
                    .push((format!("{destination_host}/{repository}"), err.diagnostic()));
                continue;
            }
        };
        for tag in tags {
            report.scanned += 1;
            let reference = format!("{destination_host}/{repository}:{tag}");
            if !expected.contains(reference.as_str()) {
                tracing::warn!("orphan artifact on destination: {reference}");
                report.orphans.push(reference);
            }
        }
    }

    report.orphans.sort();
    report.orphans.dedup();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRegistry;
    use regmirror_core::DeclaredImage;

    const HOST: &str = "mirror.example.com";

    fn catalog(images: &[(&str, &str, &str)]) -> Catalog {
        let declared: Vec<DeclaredImage> = images
            .iter()
            .map(|(registry, image, tag)| DeclaredImage {
                registry_key: registry.to_string(),
                image_key: image.to_string(),
                tags: vec![tag.to_string()],
                interval: None,
            })
            .collect();
        Catalog::build(&declared, HOST)
    }

    #[test]
    fn reports_only_untracked_artifacts() {
        let registry = FakeRegistry::default();
        registry.add_repository("docker.io/library/alpha", &["1"]);
        registry.add_repository("docker.io/library/beta", &["2"]);
        registry.add_repository("docker.io/library/gamma", &["3"]);
        let catalog = catalog(&[("docker.io", "alpha", "1"), ("docker.io", "gamma", "3")]);

        let report = find_orphans(&registry, HOST, &catalog);
        assert_eq!(report.orphans, vec![format!("{HOST}/docker.io/library/beta:2")]);
        assert_eq!(report.scanned, 3);
        assert!(report.is_complete());
    }

    #[test]
    fn extra_tag_of_tracked_repository_is_an_orphan() {
        let registry = FakeRegistry::default();
        registry.add_repository("docker.io/library/alpha", &["1", "2"]);
        let catalog = catalog(&[("docker.io", "alpha", "1")]);

        let report = find_orphans(&registry, HOST, &catalog);
        assert_eq!(report.orphans, vec![format!("{HOST}/docker.io/library/alpha:2")]);
    }

    #[test]
    fn failed_tag_listing_is_skipped() {
        let registry = FakeRegistry::default();
        registry.add_repository("docker.io/library/alpha", &["1"]);
        registry.add_repository("docker.io/library/beta", &["2"]);
        registry.fail_tag_listing("docker.io/library/alpha");
        let catalog = catalog(&[]);

        let report = find_orphans(&registry, HOST, &catalog);
        assert_eq!(report.orphans, vec![format!("{HOST}/docker.io/library/beta:2")]);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn empty_destination_has_no_orphans() {
        let registry = FakeRegistry::default();
        let report = find_orphans(&registry, HOST, &catalog(&[("docker.io", "alpha", "1")]));
        assert!(report.orphans.is_empty());
        assert_eq!(report.scanned, 0);
    }
}
