//! Registry capability boundary.
//!
//! The engine never talks to a registry directly; it goes through
//! [`RegistryClient`]. The production implementation shells out to external
//! tools ([`crate::tools::ToolRegistryClient`]); tests use in-memory fakes.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Failure of a single capability call. Always scoped to one reference or
/// one listing; the engine records it and moves on.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The tool binary could not be started.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited unsuccessfully.
    #[error("{program} exited with {}: {diagnostic}", exit_label(.code))]
    CommandFailed {
        program: String,
        code: Option<i32>,
        diagnostic: String,
    },

    /// The tool succeeded but its output is not a digest.
    #[error("malformed manifest digest for {reference}: {output:?}")]
    MalformedDigest { reference: String, output: String },

    /// Any other refusal by the registry.
    #[error("{target} unavailable: {message}")]
    Unavailable { target: String, message: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}

impl RegistryError {
    /// Operator-facing diagnostic text.
    pub fn diagnostic(&self) -> String {
        match self {
            RegistryError::CommandFailed { diagnostic, .. } if !diagnostic.is_empty() => {
                diagnostic.clone()
            }
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest digest
// ---------------------------------------------------------------------------

/// A validated manifest digest such as `sha256:<64 hex chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestDigest(String);

impl ManifestDigest {
    /// Parse tool output: the first non-empty line must be a digest.
    pub fn from_output(output: &str) -> Option<Self> {
        output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .and_then(|line| line.parse().ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl FromStr for ManifestDigest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| format!("'{s}' has no algorithm prefix"))?;
        if algorithm.is_empty()
            || !algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
        {
            return Err(format!("invalid digest algorithm '{algorithm}'"));
        }
        let bytes = hex::decode(encoded).map_err(|e| format!("invalid digest hex: {e}"))?;
        let expected = match algorithm {
            "sha256" => Some(32),
            "sha512" => Some(64),
            _ => None,
        };
        match expected {
            Some(len) if bytes.len() != len => Err(format!(
                "{algorithm} digest must be {len} bytes, got {}",
                bytes.len()
            )),
            _ if bytes.is_empty() => Err("empty digest".to_string()),
            _ => Ok(Self(s.to_ascii_lowercase())),
        }
    }
}

impl fmt::Display for ManifestDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// Everything the engine needs from registries.
///
/// `Sync` so a single client can be shared by worker threads.
pub trait RegistryClient: Sync {
    /// Digest of the manifest (index) at a fully qualified reference.
    fn manifest_digest(&self, reference: &str) -> Result<ManifestDigest, RegistryError>;

    /// Repository names hosted on `registry_host`, without the host prefix.
    fn list_repositories(&self, registry_host: &str) -> Result<Vec<String>, RegistryError>;

    /// Tags of `repository` on `registry_host`.
    fn list_tags(&self, registry_host: &str, repository: &str)
        -> Result<Vec<String>, RegistryError>;

    /// Copy every platform variant of `source_reference` below
    /// `destination_host`, keeping the source path (scoped mirroring).
    fn mirror_all_platforms(
        &self,
        source_reference: &str,
        destination_host: &str,
    ) -> Result<(), RegistryError>;
}
