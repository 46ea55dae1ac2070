//! `regmirror unlock` — clear a lock left by a crashed run.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::Args;

use regmirror_core::Settings;
use regmirror_sync::RunLock;

use crate::exit_codes;

/// Arguments for `regmirror unlock`.
#[derive(Args, Debug)]
pub struct UnlockArgs {}

impl UnlockArgs {
    pub fn run(self, settings: &Settings) -> Result<u8> {
        let path = &settings.lock_path;
        let removed = RunLock::force_release(path)
            .with_context(|| format!("failed to remove lock at {}", path.display()))?;

        match removed {
            None => println!("no lock at {}", path.display()),
            Some(acquired_at) => match Utc.timestamp_opt(acquired_at, 0).single() {
                Some(at) if acquired_at > 0 => println!(
                    "removed lock at {} (acquired {})",
                    path.display(),
                    at.to_rfc3339()
                ),
                _ => println!("removed lock at {}", path.display()),
            },
        }
        Ok(exit_codes::SUCCESS)
    }
}
