//! # regmirror-sync
//!
//! Reconciliation engine: staleness-gated digest comparison, mirroring,
//! state persistence, orphan detection and the single-run lock.
//!
//! Call [`pipeline::run`] for a full reconciliation. Registry access goes
//! through [`RegistryClient`]; [`ToolRegistryClient`] is the production
//! implementation backed by `regctl` and `skopeo`.

pub mod error;
pub mod executor;
pub mod lock;
pub mod orphans;
pub mod pipeline;
mod pool;
pub mod registry;
pub mod staleness;
pub mod state_store;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use error::SyncError;
pub use executor::SyncOutcome;
pub use lock::RunLock;
pub use orphans::{find_orphans, OrphanReport};
pub use pipeline::{load_catalog, run, run_at, RunOptions, RunReport, RunStage};
pub use registry::{ManifestDigest, RegistryClient, RegistryError};
pub use state_store::StateDatabase;
pub use tools::{ToolCommands, ToolRegistryClient};
