//! Error types for regmirror-sync.

use std::path::PathBuf;

use thiserror::Error;

use regmirror_core::CatalogError;

/// Run-level errors. Per-entry failures never surface here; they are recorded
/// as statuses or sync outcomes instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another run holds the lock. Nothing was touched.
    #[error("another run is in progress (lock held at {path}{})", since_suffix(.acquired_at))]
    LockHeld {
        path: PathBuf,
        acquired_at: Option<i64>,
    },

    /// The catalog directory itself could not be read.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (state database).
    #[error("state database JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn since_suffix(acquired_at: &Option<i64>) -> String {
    match acquired_at {
        Some(ts) => format!(", acquired at epoch {ts}"),
        None => String::new(),
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
