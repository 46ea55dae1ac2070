//! State database: the previous run's comparison results.
//!
//! Persisted as a JSON array of [`ComparisonResult`] records. Loading is
//! permissive (missing, empty or corrupt file means "no prior state" plus a
//! warning) and never fails a run. Saving replaces the file wholesale through
//! a sibling `.tmp` file and a rename, so a crash never leaves a half-written
//! database behind.

use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use regmirror_core::ComparisonResult;

use crate::error::{io_err, SyncError};

/// Prior results indexed by source reference.
#[derive(Debug, Clone, Default)]
pub struct StateDatabase {
    records: Vec<ComparisonResult>,
    index: HashMap<String, usize>,
}

impl StateDatabase {
    /// Index `records` by source reference. On duplicate keys the first
    /// record wins, matching the catalog's policy.
    pub fn from_records(records: Vec<ComparisonResult>) -> Self {
        let mut db = StateDatabase::default();
        for record in records {
            let key = record.source_full_artifact_reference.clone();
            if db.index.contains_key(&key) {
                tracing::warn!("duplicate state record for {key}; keeping first");
                continue;
            }
            db.index.insert(key, db.records.len());
            db.records.push(record);
        }
        db
    }

    pub fn get(&self, source_reference: &str) -> Option<&ComparisonResult> {
        self.index
            .get(source_reference)
            .map(|&index| &self.records[index])
    }

    pub fn records(&self) -> &[ComparisonResult] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load the database at `path`.
///
/// Individual records that fail to decode are dropped with a warning; the
/// rest of the file is kept.
pub fn load(path: &Path) -> StateDatabase {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::warn!("no state database at {}; starting fresh", path.display());
            return StateDatabase::default();
        }
        Err(err) => {
            tracing::warn!("cannot read state database {}: {err}", path.display());
            return StateDatabase::default();
        }
    };

    if contents.trim().is_empty() {
        tracing::warn!("state database {} is empty; starting fresh", path.display());
        return StateDatabase::default();
    }

    let raw: Vec<serde_json::Value> = match serde_json::from_str(&contents) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(
                "state database {} is unparsable ({err}); starting fresh",
                path.display()
            );
            return StateDatabase::default();
        }
    };

    let mut records = Vec::with_capacity(raw.len());
    for (position, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<ComparisonResult>(value) {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(
                "dropping state record #{position} in {}: {err}",
                path.display()
            ),
        }
    }
    StateDatabase::from_records(records)
}

/// Replace the database at `path` with `results`.
///
/// Write flow: serialize → `<name>.tmp` sibling → fsync → `rename`. The
/// `.tmp` file is removed on every failure path.
pub fn save(path: &Path, results: &[ComparisonResult]) -> Result<(), SyncError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let json = serde_json::to_string_pretty(results)?;
    let tmp = tmp_path(path);
    let mut guard = TmpGuard::new(&tmp);

    let mut file = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
    file.write_all(json.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| io_err(&tmp, e))?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    guard.disarm();
    tracing::debug!("saved {} record(s) to {}", results.len(), path.display());
    Ok(())
}

/// `<path>.tmp`, in the same directory as `path`.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Removes the temp file on drop unless the rename succeeded.
struct TmpGuard<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> TmpGuard<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TmpGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(self.path);
        }
    }
}
