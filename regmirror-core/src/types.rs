//! Domain types for image reconciliation.
//!
//! Timestamps are integer epoch seconds throughout; they are persisted as-is
//! in the state database and compared with plain subtraction.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Image identity
// ---------------------------------------------------------------------------

/// Canonical identity of one declared artifact.
///
/// Two identities with the same [`ImageIdentity::source_full_reference`] are
/// the same catalog entry; the catalog keeps only the first one declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageIdentity {
    pub registry: String,
    pub namespace: String,
    pub image_name: String,
    pub tag: String,
}

impl ImageIdentity {
    pub fn new(
        registry: impl Into<String>,
        namespace: impl Into<String>,
        image_name: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            namespace: namespace.into(),
            image_name: image_name.into(),
            tag: tag.into(),
        }
    }

    /// `namespace/imageName`
    pub fn repository(&self) -> String {
        format!("{}/{}", self.namespace, self.image_name)
    }

    /// `imageName:tag`
    pub fn source_short_reference(&self) -> String {
        format!("{}:{}", self.image_name, self.tag)
    }

    /// `registry/namespace/imageName:tag`
    pub fn source_full_reference(&self) -> String {
        format!(
            "{}/{}/{}:{}",
            self.registry, self.namespace, self.image_name, self.tag
        )
    }

    /// `destinationHost/registry/namespace/imageName:tag`
    ///
    /// Mirroring is scoped: the whole source reference is nested below the
    /// destination host.
    pub fn destination_full_reference(&self, destination_host: &str) -> String {
        format!("{}/{}", destination_host, self.source_full_reference())
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source_full_reference())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Outcome of the most recent digest comparison for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Source and destination digests match.
    Ok,
    /// Both digests were retrieved and differ.
    SyncNeeded,
    ErrorRetrievingManifestFromSource,
    ErrorRetrievingManifestFromDestination,
    ErrorRetrievingManifestFromBoth,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Ok,
        Status::SyncNeeded,
        Status::ErrorRetrievingManifestFromSource,
        Status::ErrorRetrievingManifestFromDestination,
        Status::ErrorRetrievingManifestFromBoth,
    ];

    /// Classify a pair of digest lookups.
    ///
    /// `None` means the lookup failed.
    pub fn classify(source: Option<&str>, destination: Option<&str>) -> Self {
        match (source, destination) {
            (Some(src), Some(dst)) if src == dst => Status::Ok,
            (Some(_), Some(_)) => Status::SyncNeeded,
            (Some(_), None) => Status::ErrorRetrievingManifestFromDestination,
            (None, Some(_)) => Status::ErrorRetrievingManifestFromSource,
            (None, None) => Status::ErrorRetrievingManifestFromBoth,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            Status::ErrorRetrievingManifestFromSource
                | Status::ErrorRetrievingManifestFromDestination
                | Status::ErrorRetrievingManifestFromBoth
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::SyncNeeded => "SYNC_NEEDED",
            Status::ErrorRetrievingManifestFromSource => "ERROR_RETRIEVING_MANIFEST_FROM_SOURCE",
            Status::ErrorRetrievingManifestFromDestination => {
                "ERROR_RETRIEVING_MANIFEST_FROM_DESTINATION"
            }
            Status::ErrorRetrievingManifestFromBoth => "ERROR_RETRIEVING_MANIFEST_FROM_BOTH",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Comparison result (persisted unit)
// ---------------------------------------------------------------------------

/// Per-entry comparison outcome. One record per catalog entry is persisted in
/// the state database after every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComparisonResult {
    pub source_full_artifact_reference: String,
    pub destination_full_artifact_reference: String,
    #[serde(default)]
    pub source_hash: String,
    #[serde(default)]
    pub destination_hash: String,
    pub status: Status,
    #[serde(default)]
    pub last_check: i64,
    #[serde(default)]
    pub last_update: i64,
}

impl ComparisonResult {
    /// `imageName:tag`, derived from the source reference.
    pub fn short_reference(&self) -> &str {
        self.source_full_artifact_reference
            .rsplit('/')
            .next()
            .unwrap_or(&self.source_full_artifact_reference)
    }
}

// ---------------------------------------------------------------------------
// Catalog entry (run-scoped working record)
// ---------------------------------------------------------------------------

/// One declared artifact plus the run-scoped fields inherited from prior
/// state. Built by the catalog, enriched by the state merge, then turned into
/// a [`ComparisonResult`] by the decision engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub identity: ImageIdentity,
    pub destination_reference: String,
    /// Per-entry staleness interval override in seconds.
    pub interval: Option<u64>,
    pub status: Option<Status>,
    pub last_check: i64,
    pub last_update: i64,
    pub source_hash: String,
    pub destination_hash: String,
}

impl CatalogEntry {
    pub fn new(identity: ImageIdentity, destination_host: &str) -> Self {
        let destination_reference = identity.destination_full_reference(destination_host);
        Self {
            identity,
            destination_reference,
            interval: None,
            status: None,
            last_check: 0,
            last_update: 0,
            source_hash: String::new(),
            destination_hash: String::new(),
        }
    }

    pub fn source_reference(&self) -> String {
        self.identity.source_full_reference()
    }

    /// Copy prior outcome fields onto this entry.
    ///
    /// The prior record is ignored (returns `false`) when it describes a
    /// different destination, since its destination digest says nothing about
    /// the current one.
    pub fn inherit(&mut self, prior: &ComparisonResult) -> bool {
        if prior.destination_full_artifact_reference != self.destination_reference {
            return false;
        }
        self.status = Some(prior.status);
        self.last_check = prior.last_check;
        self.last_update = prior.last_update;
        self.source_hash = prior.source_hash.clone();
        self.destination_hash = prior.destination_hash.clone();
        true
    }

    /// Snapshot the entry's current fields as a persisted record.
    ///
    /// Returns `None` when the entry has never been evaluated.
    pub fn to_result(&self) -> Option<ComparisonResult> {
        let status = self.status?;
        Some(ComparisonResult {
            source_full_artifact_reference: self.source_reference(),
            destination_full_artifact_reference: self.destination_reference.clone(),
            source_hash: self.source_hash.clone(),
            destination_hash: self.destination_hash.clone(),
            status,
            last_check: self.last_check,
            last_update: self.last_update,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
