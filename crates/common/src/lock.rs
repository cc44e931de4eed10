//! UUCP style device lock files
//!
//! A device such as `/dev/ttyUSB0` is locked by creating
//! `/var/lock/LCK..ttyUSB0` containing the owning process id as a ten
//! column, right aligned decimal number followed by a newline. Other
//! programs that follow the same convention (minicom, ModemManager, the
//! uucp suite) honour these files.
//!
//! A lock file whose owner no longer exists is stale. Acquisition removes
//! a stale file and tries to create a fresh one exactly once.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::error::LockError;

/// Default lock file directory
pub const DEFAULT_LOCK_DIR: &str = "/var/lock";

/// Default lock file name prefix
pub const DEFAULT_LOCK_PREFIX: &str = "LCK..";

/// Upper bound on the bytes read from an existing lock file
const PID_READ_LIMIT: u64 = 20;

/// Liveness oracle for the process recorded in a lock file
pub trait ProcessProbe {
    fn is_alive(&self, pid: i32) -> bool;
}

/// Probe that sends the null signal to the recorded process
///
/// `EPERM` means the process exists but belongs to another user, so it
/// counts as alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl ProcessProbe for SignalProbe {
    fn is_alive(&self, pid: i32) -> bool {
        // 0 and negative ids address process groups, never a lock owner
        if pid <= 0 {
            return false;
        }

        match kill(Pid::from_raw(pid), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

impl<F> ProcessProbe for F
where
    F: Fn(i32) -> bool,
{
    fn is_alive(&self, pid: i32) -> bool {
        self(pid)
    }
}

/// Lock file store rooted at one directory
#[derive(Debug, Clone)]
pub struct LockStore<P = SignalProbe> {
    directory: PathBuf,
    prefix: String,
    probe: P,
}

impl LockStore<SignalProbe> {
    /// Create a store using the null-signal liveness probe
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self::with_probe(directory, prefix, SignalProbe)
    }
}

impl Default for LockStore<SignalProbe> {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_DIR, DEFAULT_LOCK_PREFIX)
    }
}

impl<P: ProcessProbe> LockStore<P> {
    /// Create a store with a custom liveness probe
    pub fn with_probe(directory: impl Into<PathBuf>, prefix: impl Into<String>, probe: P) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            probe,
        }
    }

    /// Directory holding the lock files
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Lock file path for a device
    ///
    /// Only the final component of `device` is used, so `/dev/ttyUSB0` and
    /// `ttyUSB0` share a lock.
    pub fn lock_path(&self, device: &Path) -> PathBuf {
        let name = device.file_name().unwrap_or(device.as_os_str());
        let mut file_name = OsString::from(&self.prefix);
        file_name.push(name);
        self.directory.join(file_name)
    }

    /// Read the pid recorded for a device
    ///
    /// Returns `None` when there is no lock file or its content is not a pid.
    pub fn owner(&self, device: &Path) -> Result<Option<i32>, LockError> {
        let path = self.lock_path(device);
        if !path.exists() {
            return Ok(None);
        }
        read_owner(&path)
    }

    /// Acquire the lock for `device`
    ///
    /// The returned guard releases the lock when dropped; call
    /// [`DeviceLock::release`] to observe release failures.
    pub fn acquire(&self, device: &Path) -> Result<DeviceLock<'_, P>, LockError> {
        let path = self.lock_path(device);

        if fs::metadata(&path).is_ok() {
            match read_owner(&path)? {
                Some(owner) if self.probe.is_alive(owner) => {
                    return Err(LockError::AlreadyLocked {
                        device: device.to_path_buf(),
                        owner,
                    });
                }
                owner => {
                    warn!(
                        "Removing stale lock file {} (owner {})",
                        path.display(),
                        owner.map_or_else(|| "unknown".to_string(), |pid| pid.to_string())
                    );
                    fs::remove_file(&path).map_err(|source| LockError::StaleLockUnremovable {
                        path: path.clone(),
                        source,
                    })?;
                }
            }
        }

        create_lock_file(&path, std::process::id())?;
        info!("Locked {} ({})", device.display(), path.display());

        Ok(DeviceLock {
            store: self,
            device: device.to_path_buf(),
            released: false,
        })
    }

    /// Remove the lock file for `device`
    pub fn release(&self, device: &Path) -> Result<(), LockError> {
        let path = self.lock_path(device);

        fs::remove_file(&path).map_err(|source| LockError::LockFileUnremovable {
            path: path.clone(),
            source,
        })?;

        debug!("Released lock {}", path.display());
        Ok(())
    }
}

/// Ownership of one device lock
///
/// Dropping the guard without calling [`DeviceLock::release`] still removes
/// the lock file and logs any failure.
#[derive(Debug)]
pub struct DeviceLock<'a, P: ProcessProbe = SignalProbe> {
    store: &'a LockStore<P>,
    device: PathBuf,
    released: bool,
}

impl<P: ProcessProbe> DeviceLock<'_, P> {
    /// Device path this lock guards
    pub fn device(&self) -> &Path {
        &self.device
    }

    /// Release the lock, reporting failure
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.store.release(&self.device)
    }
}

impl<P: ProcessProbe> Drop for DeviceLock<'_, P> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.store.release(&self.device) {
                warn!("{}", e);
            }
        }
    }
}

/// Read and parse the pid stored in an existing lock file
fn read_owner(path: &Path) -> Result<Option<i32>, LockError> {
    let unreadable = |source| LockError::LockFileUnreadable {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(unreadable)?;
    let size = file.metadata().map_err(unreadable)?.len();

    let mut content = Vec::with_capacity(PID_READ_LIMIT as usize);
    file.take(size.min(PID_READ_LIMIT))
        .read_to_end(&mut content)
        .map_err(unreadable)?;

    if content.is_empty() {
        return Err(unreadable(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "lock file is empty",
        )));
    }

    Ok(parse_pid(&content))
}

/// Parse the leading decimal pid of a lock file
fn parse_pid(content: &[u8]) -> Option<i32> {
    String::from_utf8_lossy(content)
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
}

/// Format a pid the way lock files store it
pub fn format_pid(pid: u32) -> String {
    format!("{:>10}\n", pid)
}

/// Exclusively create the lock file and record `pid`
fn create_lock_file(path: &Path, pid: u32) -> Result<(), LockError> {
    let uncreatable = |source| LockError::LockFileUncreatable {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)
        .map_err(uncreatable)?;

    if let Err(e) = file.write_all(format_pid(pid).as_bytes()) {
        // An empty lock file would read as unreadable to everyone else
        drop(file);
        let _ = fs::remove_file(path);
        return Err(uncreatable(e));
    }

    Ok(())
}
