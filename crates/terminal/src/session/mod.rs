//! Terminal session
//!
//! A session turns a [`Target`] into one [`Selection`], then runs the
//! guarded lifecycle:
//!
//! ```text
//! Idle -> Selecting -> Locked -> Configured -> Bridging -> Closing -> Idle
//! ```
//!
//! The device lock is released on every path out of `Locked` and later
//! states. Nothing is retried; every failure ends the session.

pub mod bridge;
pub mod selection;
pub mod serial;
pub mod signals;

pub use bridge::{BridgeError, BridgeExit};
pub use selection::Selection;
pub use serial::{LineConfigurator, RawLine, SerialError};

use common::{LockError, LockStore, ProcessProbe};
use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::usb::{Discovery, DiscoveryError, UsbEnumerator};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("No SCS devices found!")]
    NoCandidates,

    #[error("invalid input \"{input}\"")]
    AmbiguousSelectionInput { input: String },

    #[error("cannot read selection: {0}")]
    SelectionIo(#[source] io::Error),

    #[error("could not open {}: {source}", .path.display())]
    DeviceOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not configure {} for {baud} baud: {source}", .path.display())]
    DeviceConfigureFailed {
        path: PathBuf,
        baud: u32,
        #[source]
        source: SerialError,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// What the operator asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A device path, bypassing discovery
    Explicit { path: PathBuf, baud: Option<u32> },
    /// Whatever SCS modem discovery finds
    Discover,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Selecting,
    Locked,
    Configured,
    Bridging,
    Closing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Selecting => "selecting",
            Phase::Locked => "locked",
            Phase::Configured => "configured",
            Phase::Bridging => "bridging",
            Phase::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Drives one session from selection to lock release
pub struct Controller<'a, P: ProcessProbe, C: LineConfigurator> {
    locks: &'a LockStore<P>,
    configurator: C,
    fallback_baud: u32,
    phase: Phase,
}

impl<'a, P: ProcessProbe, C: LineConfigurator> Controller<'a, P, C> {
    pub fn new(locks: &'a LockStore<P>, configurator: C, fallback_baud: u32) -> Self {
        Self {
            locks,
            configurator,
            fallback_baud,
            phase: Phase::Idle,
        }
    }

    /// Current lifecycle state
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, next: Phase) {
        debug!("Session {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Resolve `target` to one device
    ///
    /// An explicit path skips discovery and runs at the given baud rate, or
    /// the fallback rate. Otherwise discovery runs once and, with several
    /// modems attached, the operator picks one through `input`/`prompt`.
    pub fn select<E, R, W>(
        &mut self,
        target: Target,
        discovery: &Discovery<E>,
        input: &mut R,
        prompt: &mut W,
    ) -> Result<Selection, SessionError>
    where
        E: UsbEnumerator,
        R: BufRead,
        W: Write,
    {
        if let Target::Explicit { path, baud } = target {
            return Ok(Selection::explicit(path, baud.unwrap_or(self.fallback_baud)));
        }

        self.enter(Phase::Selecting);
        let result = discovery
            .discover()
            .map_err(SessionError::from)
            .and_then(|candidates| {
                let index = selection::choose(&candidates, input, prompt)?;
                Ok(Selection::discovered(&candidates[index], self.fallback_baud))
            });
        self.enter(Phase::Idle);
        result
    }

    /// Lock, open and configure the device, then bridge it to the terminal
    /// until `running` is cleared or either side closes
    ///
    /// Once the lock is held it is released before returning, whatever
    /// happened in between. A release failure after an otherwise clean
    /// session is returned as the session's error.
    pub fn run<I, O>(
        &mut self,
        selection: &Selection,
        input: &mut I,
        output: &mut O,
        running: &AtomicBool,
    ) -> Result<BridgeExit, SessionError>
    where
        I: AsFd + Read,
        O: Write,
    {
        let path = &selection.tty_path;
        let locks = self.locks;

        let lock = locks.acquire(path)?;
        self.enter(Phase::Locked);

        let mut device = match serial::open_device(path) {
            Ok(device) => device,
            Err(source) => {
                self.release_after_failure(lock);
                return Err(SessionError::DeviceOpenFailed {
                    path: path.clone(),
                    source,
                });
            }
        };

        if let Err(source) = self.configurator.configure(&device, selection.baud) {
            if let Err(e) = serial::close_device(device) {
                warn!("Closing {} failed: {}", path.display(), e);
            }
            self.release_after_failure(lock);
            return Err(SessionError::DeviceConfigureFailed {
                path: path.clone(),
                baud: selection.baud,
                source,
            });
        }
        self.enter(Phase::Configured);
        info!("{} configured for {} baud", path.display(), selection.baud);

        self.enter(Phase::Bridging);
        let outcome = bridge::run(&mut device, input, output, running);
        if let Ok(exit) = &outcome {
            debug!("Bridge ended: {:?}", exit);
        }

        self.enter(Phase::Closing);
        if let Err(e) = serial::close_device(device) {
            warn!("Closing {} failed: {}", path.display(), e);
        }
        let released = lock.release();
        self.enter(Phase::Idle);

        match (outcome, released) {
            (Ok(exit), Ok(())) => Ok(exit),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), released) => {
                if let Err(release_error) = released {
                    error!("{}", release_error);
                }
                Err(e.into())
            }
        }
    }

    /// Drop the lock after a failed open or configure
    ///
    /// The open or configure error is what the caller reports, so a release error
    /// is only logged.
    fn release_after_failure(&mut self, lock: common::DeviceLock<'_, P>) {
        self.enter(Phase::Closing);
        if let Err(e) = lock.release() {
            error!("{}", e);
        }
        self.enter(Phase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::TtyResolver;
    use crate::usb::enumerate::{AttachedDevice, UsbAddress};
    use std::fs::File;
    use std::os::unix::net::UnixStream;
    use std::path::Path;
    use tempfile::{NamedTempFile, TempDir, tempdir};

    /// Accepts any descriptor without touching it
    struct NoopLine;

    impl LineConfigurator for NoopLine {
        fn configure(&self, _device: &File, _baud: u32) -> Result<(), SerialError> {
            Ok(())
        }
    }

    struct FixedBus(Vec<AttachedDevice>);

    impl UsbEnumerator for FixedBus {
        fn attached(&self) -> Result<Vec<AttachedDevice>, DiscoveryError> {
            Ok(self.0.clone())
        }
    }

    fn lock_store() -> (TempDir, LockStore) {
        let dir = tempdir().unwrap();
        let store = LockStore::new(dir.path(), "LCK..");
        (dir, store)
    }

    fn scs_bus(ports: &[u8]) -> (TempDir, Discovery<FixedBus>) {
        let root = tempdir().unwrap();
        let mut bus = Vec::new();
        for port in ports {
            let interface = root.path().join(format!("1-{}:1.0", port));
            std::fs::create_dir_all(interface.join(format!("ttyUSB{}", port))).unwrap();
            bus.push(AttachedDevice {
                vendor_id: 0x0403,
                product_id: 0xD010 | u16::from(*port),
                address: UsbAddress::new(1, vec![*port]),
            });
        }
        let discovery = Discovery::new(FixedBus(bus), TtyResolver::new(root.path(), "/dev"));
        (root, discovery)
    }

    fn run_once<C: LineConfigurator>(
        store: &LockStore,
        configurator: C,
        selection: &Selection,
    ) -> Result<BridgeExit, SessionError> {
        let (mut input, _keyboard) = UnixStream::pair().unwrap();
        let mut output: Vec<u8> = Vec::new();
        let running = AtomicBool::new(true);

        let mut controller = Controller::new(store, configurator, 115_200);
        let result = controller.run(selection, &mut input, &mut output, &running);
        assert_eq!(controller.phase(), Phase::Idle);
        result
    }

    #[test]
    fn test_explicit_target_skips_discovery() {
        let (_locks, store) = lock_store();
        let discovery = Discovery::new(FixedBus(Vec::new()), TtyResolver::default());
        let mut controller = Controller::new(&store, NoopLine, 115_200);

        let target = Target::Explicit {
            path: PathBuf::from("/dev/ttyS0"),
            baud: None,
        };
        let selection = controller
            .select(target, &discovery, &mut &b""[..], &mut io::sink())
            .unwrap();
        assert_eq!(selection.tty_path, PathBuf::from("/dev/ttyS0"));
        assert_eq!(selection.baud, 115_200);

        let target = Target::Explicit {
            path: PathBuf::from("/dev/ttyS0"),
            baud: Some(9600),
        };
        let selection = controller
            .select(target, &discovery, &mut &b""[..], &mut io::sink())
            .unwrap();
        assert_eq!(selection.baud, 9600);
    }

    #[test]
    fn test_discovery_without_devices() {
        let (_locks, store) = lock_store();
        let (_sysfs, discovery) = scs_bus(&[]);
        let mut controller = Controller::new(&store, NoopLine, 115_200);

        let err = controller
            .select(Target::Discover, &discovery, &mut &b""[..], &mut io::sink())
            .unwrap_err();
        assert!(matches!(err, SessionError::NoCandidates));
        assert_eq!(controller.phase(), Phase::Idle);
    }

    #[test]
    fn test_single_device_auto_selected() {
        let (_locks, store) = lock_store();
        let (_sysfs, discovery) = scs_bus(&[2]);
        let mut controller = Controller::new(&store, NoopLine, 115_200);

        let selection = controller
            .select(Target::Discover, &discovery, &mut &b""[..], &mut io::sink())
            .unwrap();
        assert_eq!(selection.tty_path, PathBuf::from("/dev/ttyUSB2"));
        assert_eq!(selection.label, "P4dragon DR-7800");
        assert_eq!(selection.baud, 829_440);
    }

    #[test]
    fn test_operator_picks_among_devices() {
        let (_locks, store) = lock_store();
        let (_sysfs, discovery) = scs_bus(&[0, 1, 5]);
        let mut controller = Controller::new(&store, NoopLine, 115_200);

        let selection = controller
            .select(Target::Discover, &discovery, &mut &b"3\n"[..], &mut io::sink())
            .unwrap();
        assert_eq!(selection.tty_path, PathBuf::from("/dev/ttyUSB5"));
        assert_eq!(selection.label, "PTC-IIIusb");

        let err = controller
            .select(Target::Discover, &discovery, &mut &b"4\n"[..], &mut io::sink())
            .unwrap_err();
        assert!(matches!(err, SessionError::AmbiguousSelectionInput { .. }));
    }

    #[test]
    fn test_open_failure_releases_lock() {
        let (_locks, store) = lock_store();
        let selection = Selection::explicit(PathBuf::from("/dev/nonexistent-scs-tty"), 115_200);

        let err = run_once(&store, NoopLine, &selection).unwrap_err();
        assert!(matches!(err, SessionError::DeviceOpenFailed { .. }));
        assert!(!store.lock_path(&selection.tty_path).exists());
    }

    #[test]
    fn test_configure_failure_releases_lock() {
        let (_locks, store) = lock_store();
        let device = NamedTempFile::new().unwrap();
        let selection = Selection::explicit(device.path().to_path_buf(), 115_200);

        let err = run_once(&store, RawLine, &selection).unwrap_err();
        assert!(matches!(err, SessionError::DeviceConfigureFailed { .. }));
        assert!(!store.lock_path(&selection.tty_path).exists());
    }

    #[test]
    fn test_busy_device_is_not_opened() {
        let (_locks, store) = lock_store();
        let device = NamedTempFile::new().unwrap();
        let selection = Selection::explicit(device.path().to_path_buf(), 115_200);

        let held = store.acquire(device.path()).unwrap();
        let err = run_once(&store, NoopLine, &selection).unwrap_err();
        assert!(matches!(err, SessionError::Lock(LockError::AlreadyLocked { .. })));

        // The other session's lock is untouched
        assert!(store.lock_path(device.path()).exists());
        held.release().unwrap();
    }

    #[test]
    fn test_session_releases_lock_at_end() {
        let (_locks, store) = lock_store();
        // A regular file reads as end of file right away
        let device = NamedTempFile::new().unwrap();
        let selection = Selection::explicit(device.path().to_path_buf(), 115_200);

        let exit = run_once(&store, NoopLine, &selection).unwrap();
        assert_eq!(exit, BridgeExit::DeviceClosed);
        assert!(!store.lock_path(&selection.tty_path).exists());

        // The wake byte reached the device
        assert_eq!(std::fs::read(device.path()).unwrap(), b"\r");
    }

    #[test]
    fn test_lost_lock_fails_clean_session() {
        let (locks, store) = lock_store();
        let device = NamedTempFile::new().unwrap();
        let selection = Selection::explicit(device.path().to_path_buf(), 115_200);

        // Device EOF ends the bridge; removing the lock directory first
        // makes the final release fail
        let (mut input, _keyboard) = UnixStream::pair().unwrap();
        let running = AtomicBool::new(true);
        let mut controller = Controller::new(&store, RemoveLockDir(locks.path()), 115_200);

        let err = controller
            .run(&selection, &mut input, &mut io::sink(), &running)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Lock(LockError::LockFileUnremovable { .. })
        ));
    }

    /// Deletes the lock directory while the device is being configured
    struct RemoveLockDir<'p>(&'p Path);

    impl LineConfigurator for RemoveLockDir<'_> {
        fn configure(&self, _device: &File, _baud: u32) -> Result<(), SerialError> {
            std::fs::remove_dir_all(self.0).unwrap();
            Ok(())
        }
    }
}
