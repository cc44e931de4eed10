//! tty node resolution through sysfs
//!
//! The FTDI driver registers the serial port of interface 0 as a child of
//! `/sys/bus/usb/devices/<bus>-<ports>:1.0/`, named `ttyUSB<n>`. The same
//! name appears under `/dev`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::enumerate::UsbAddress;

/// Default sysfs directory listing USB devices and interfaces
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/bus/usb/devices";

/// Default directory of device nodes
pub const DEFAULT_DEVICE_DIR: &str = "/dev";

/// Substring identifying a USB serial tty entry
const TTY_MARKER: &str = "ttyUSB";

/// Configuration/interface suffix of the serial interface
const SERIAL_INTERFACE: &str = ":1.0";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("device at {address} has no port numbers")]
    NoPorts { address: UsbAddress },

    #[error("cannot scan {}: {source}", .dir.display())]
    Scan {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no tty found in {}", .dir.display())]
    NoTty { dir: PathBuf },

    #[error("{} ttys found in {}: {}", .names.len(), .dir.display(), .names.join(", "))]
    Ambiguous { dir: PathBuf, names: Vec<String> },
}

/// Maps USB topological addresses to tty device nodes
#[derive(Debug, Clone)]
pub struct TtyResolver {
    sysfs_root: PathBuf,
    device_dir: PathBuf,
}

impl Default for TtyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT, DEFAULT_DEVICE_DIR)
    }
}

impl TtyResolver {
    pub fn new(sysfs_root: impl Into<PathBuf>, device_dir: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            device_dir: device_dir.into(),
        }
    }

    /// sysfs directory of the serial interface of the device at `address`
    pub fn interface_dir(&self, address: &UsbAddress) -> Result<PathBuf, ResolveError> {
        let name = address.kernel_name().ok_or_else(|| ResolveError::NoPorts {
            address: address.clone(),
        })?;

        Ok(self.sysfs_root.join(format!("{}{}", name, SERIAL_INTERFACE)))
    }

    /// Resolve the tty node of the device at `address`
    ///
    /// Exactly one tty entry must exist in the interface directory; none or
    /// several is an error so the caller can skip the device.
    pub fn resolve(&self, address: &UsbAddress) -> Result<PathBuf, ResolveError> {
        let dir = self.interface_dir(address)?;
        debug!("Searching tty of {} in {}", address, dir.display());

        let mut names = scan_ttys(&dir)?;
        match names.len() {
            0 => Err(ResolveError::NoTty { dir }),
            1 => Ok(self.device_dir.join(names.remove(0))),
            _ => Err(ResolveError::Ambiguous { dir, names }),
        }
    }
}

/// Names of the tty entries in `dir`, sorted
fn scan_ttys(dir: &Path) -> Result<Vec<String>, ResolveError> {
    let scan_error = |source| ResolveError::Scan {
        dir: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(scan_error)? {
        let entry = entry.map_err(scan_error)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.contains(TTY_MARKER) {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}
