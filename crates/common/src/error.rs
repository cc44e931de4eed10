//! Common error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the lock store
///
/// Every variant names the lock file it concerns so the operator can
/// inspect or remove it by hand.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("cannot create lock file \"{}\": {source}", .path.display())]
    LockFileUncreatable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read existing lock file \"{}\": {source}", .path.display())]
    LockFileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to unlink stale lock file \"{}\": {source}", .path.display())]
    StaleLockUnremovable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("device {} is locked by process {owner}", .device.display())]
    AlreadyLocked { device: PathBuf, owner: i32 },

    #[error("unable to unlink lock file \"{}\": {source}", .path.display())]
    LockFileUnremovable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
