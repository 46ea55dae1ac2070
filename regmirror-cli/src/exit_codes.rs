//! Process exit codes, following sysexits.h where one fits.

use regmirror_core::ConfigError;
use regmirror_sync::SyncError;

pub const SUCCESS: u8 = 0;

/// Catch-all failure.
pub const GENERAL_ERROR: u8 = 1;

/// State could not be written. EX_IOERR.
pub const IO_ERROR: u8 = 74;

/// Another run holds the lock; try again later. EX_TEMPFAIL.
pub const LOCK_HELD: u8 = 75;

/// Missing or invalid settings. EX_CONFIG.
pub const CONFIG_ERROR: u8 = 78;

/// Terminated by SIGINT (128 + 2).
pub const INTERRUPTED: u8 = 130;

/// Map an error chain to an exit code.
pub fn classify(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(sync) = cause.downcast_ref::<SyncError>() {
            return match sync {
                SyncError::LockHeld { .. } => LOCK_HELD,
                SyncError::Catalog(_) => CONFIG_ERROR,
                SyncError::Io { .. } | SyncError::Json(_) => IO_ERROR,
            };
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return CONFIG_ERROR;
        }
    }
    GENERAL_ERROR
}
