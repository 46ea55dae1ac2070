//! Error types for regmirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading declared image catalogs.
///
/// The directory loader never surfaces these for individual files; it logs
/// them and skips the offending file. They are returned directly only by the
/// single-file and single-document entry points.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying I/O failure, annotated with the path being read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error, with the file path and serde_yaml line context.
    #[error("failed to parse catalog at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A document parsed as YAML but does not have the catalog shape.
    #[error("malformed catalog entry '{key}': {message}")]
    Malformed { key: String, message: String },
}

/// Errors raised while assembling [`crate::config::Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting without a default was not provided.
    #[error("missing required setting {key}")]
    Missing { key: &'static str },

    /// A setting was provided but could not be interpreted.
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The `.env` file exists but could not be read.
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    /// A state or lock path had to be defaulted, but neither `DATA_DIR` nor a
    /// home directory is available.
    #[error("cannot determine home directory; set DATA_DIR or $HOME")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CatalogError {
    CatalogError::Io {
        path: path.into(),
        source,
    }
}
