//! regmirror core library — domain types, declared catalog, settings, errors.
//!
//! - [`types`] — identities, statuses, persisted comparison records
//! - [`catalog`] — catalog file loading and the deduplicated working set
//! - [`config`] — immutable [`Settings`]
//! - [`error`] — [`CatalogError`], [`ConfigError`]

pub mod catalog;
pub mod config;
pub mod error;
pub mod types;

pub use catalog::{Catalog, CatalogSource, DeclaredImage};
pub use config::{Settings, ToolSettings};
pub use error::{CatalogError, ConfigError};
pub use types::{CatalogEntry, ComparisonResult, ImageIdentity, Status};
