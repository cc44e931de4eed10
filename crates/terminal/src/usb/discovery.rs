//! SCS modem discovery
//!
//! One call to [`Discovery::discover`] is one point-in-time snapshot: the
//! USB bus is listed, SCS devices are picked out by vendor/product id and
//! each is resolved to its tty node. A device whose tty cannot be resolved
//! is reported as a warning and left out; it never fails the whole pass.

use common::catalog::{self, ModelProfile};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use super::enumerate::{AttachedDevice, UsbEnumerator};
use super::sysfs::TtyResolver;

/// Maximum number of SCS devices reported by one discovery pass
pub const MAX_SCS_DEVICES: usize = 8;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("USB discovery unavailable: {what}: {source}")]
    Unavailable {
        what: &'static str,
        #[source]
        source: rusb::Error,
    },
}

/// An attached SCS modem and its tty node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub tty_path: PathBuf,
    pub model_code: u8,
    pub product_id: u16,
}

impl DiscoveredDevice {
    /// Catalog entry for this device's model
    pub fn profile(&self) -> &'static ModelProfile {
        catalog::profile(self.model_code)
    }
}

/// Discovers SCS modems
#[derive(Debug, Clone)]
pub struct Discovery<E> {
    enumerator: E,
    resolver: TtyResolver,
    max_devices: usize,
}

impl<E: UsbEnumerator> Discovery<E> {
    pub fn new(enumerator: E, resolver: TtyResolver) -> Self {
        Self {
            enumerator,
            resolver,
            max_devices: MAX_SCS_DEVICES,
        }
    }

    /// Limit the number of matches considered per pass
    pub fn with_max_devices(mut self, max_devices: usize) -> Self {
        self.max_devices = max_devices;
        self
    }

    /// Take a snapshot of the attached SCS modems
    ///
    /// The order is the USB enumeration order.
    pub fn discover(&self) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
        let attached = self.enumerator.attached()?;

        let devices: Vec<DiscoveredDevice> = attached
            .iter()
            .filter(|device| catalog::is_scs_modem(device.vendor_id, device.product_id))
            .take(self.max_devices)
            .filter_map(|device| self.classify(device))
            .collect();

        debug!("Found {} SCS devices", devices.len());
        Ok(devices)
    }

    /// Resolve one matching USB device, or skip it with a warning
    fn classify(&self, device: &AttachedDevice) -> Option<DiscoveredDevice> {
        debug!(
            "ID {:04x}:{:04x} at {}",
            device.vendor_id, device.product_id, device.address
        );

        match self.resolver.resolve(&device.address) {
            Ok(tty_path) => {
                let model_code = catalog::model_code(device.product_id);
                debug!(
                    "{} -> {} (model code {})",
                    device.address,
                    tty_path.display(),
                    model_code
                );
                Some(DiscoveredDevice {
                    tty_path,
                    model_code,
                    product_id: device.product_id,
                })
            }
            Err(e) => {
                warn!("USB search: tty search error: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::enumerate::UsbAddress;
    use std::fs;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    /// Enumerator returning a fixed device list
    struct FixedBus(Vec<AttachedDevice>);

    impl UsbEnumerator for FixedBus {
        fn attached(&self) -> Result<Vec<AttachedDevice>, DiscoveryError> {
            Ok(self.0.clone())
        }
    }

    /// Enumerator whose libusb context cannot be created
    struct BrokenBus;

    impl UsbEnumerator for BrokenBus {
        fn attached(&self) -> Result<Vec<AttachedDevice>, DiscoveryError> {
            Err(DiscoveryError::Unavailable {
                what: "unable to initialize libusb",
                source: rusb::Error::NoDevice,
            })
        }
    }

    fn device(vendor_id: u16, product_id: u16, port: u8) -> AttachedDevice {
        AttachedDevice {
            vendor_id,
            product_id,
            address: UsbAddress::new(1, vec![port]),
        }
    }

    /// sysfs tree with `ttyUSB<port>` under the interface of every port
    fn sysfs_with_ttys(ports: &[u8]) -> TempDir {
        let root = tempdir().unwrap();
        for port in ports {
            let tty = root
                .path()
                .join(format!("1-{}:1.0", port))
                .join(format!("ttyUSB{}", port));
            fs::create_dir_all(tty).unwrap();
        }
        root
    }

    fn discovery(bus: Vec<AttachedDevice>, root: &Path) -> Discovery<FixedBus> {
        Discovery::new(FixedBus(bus), TtyResolver::new(root, "/dev"))
    }

    #[test]
    fn test_vendor_mismatch_is_excluded() {
        let root = sysfs_with_ttys(&[1, 2]);
        let found = discovery(vec![device(0x10C4, 0xD010, 1), device(0x0403, 0xD010, 2)], root.path())
            .discover()
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tty_path, PathBuf::from("/dev/ttyUSB2"));
    }

    #[test]
    fn test_product_outside_block_is_excluded() {
        let root = sysfs_with_ttys(&[1, 2, 3]);
        let found = discovery(
            vec![
                device(0x0403, 0x6001, 1),
                device(0x0403, 0xD018, 2),
                device(0x0403, 0xD00F, 3),
            ],
            root.path(),
        )
        .discover()
        .unwrap();

        assert!(found.is_empty());
    }

    #[test]
    fn test_model_codes() {
        let root = sysfs_with_ttys(&[1, 2]);
        let found = discovery(vec![device(0x0403, 0xD010, 1), device(0x0403, 0xD015, 2)], root.path())
            .discover()
            .unwrap();

        assert_eq!(found[0].model_code, 0);
        assert_eq!(found[0].profile().display_name, "PTC-IIusb");
        assert_eq!(found[1].model_code, 5);
        assert_eq!(found[1].profile().display_name, "PTC-IIIusb");
    }

    #[test]
    fn test_unused_model_is_still_reported() {
        let root = sysfs_with_ttys(&[1]);
        let found = discovery(vec![device(0x0403, 0xD014, 1)], root.path())
            .discover()
            .unwrap();

        assert_eq!(found.len(), 1);
        assert!(!found[0].profile().is_known());
    }

    #[test]
    fn test_unresolvable_device_is_skipped() {
        // Port 2 has no tty, so only port 1 is reported
        let root = sysfs_with_ttys(&[1]);
        let found = discovery(vec![device(0x0403, 0xD010, 1), device(0x0403, 0xD011, 2)], root.path())
            .discover()
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].model_code, 0);
    }

    #[test]
    fn test_ambiguous_device_is_skipped() {
        let root = sysfs_with_ttys(&[1, 2]);
        fs::create_dir(root.path().join("1-2:1.0").join("ttyUSB9")).unwrap();

        let found = discovery(vec![device(0x0403, 0xD010, 1), device(0x0403, 0xD012, 2)], root.path())
            .discover()
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tty_path, PathBuf::from("/dev/ttyUSB1"));
    }

    #[test]
    fn test_enumeration_order_is_kept() {
        let root = sysfs_with_ttys(&[1, 2, 3]);
        let found = discovery(
            vec![
                device(0x0403, 0xD013, 3),
                device(0x0403, 0xD010, 1),
                device(0x0403, 0xD011, 2),
            ],
            root.path(),
        )
        .discover()
        .unwrap();

        let codes: Vec<u8> = found.iter().map(|d| d.model_code).collect();
        assert_eq!(codes, vec![3, 0, 1]);
    }

    #[test]
    fn test_match_cap() {
        let ports: Vec<u8> = (1..=10).collect();
        let root = sysfs_with_ttys(&ports);
        let bus = ports.iter().map(|p| device(0x0403, 0xD010, *p)).collect();

        let found = discovery(bus, root.path()).discover().unwrap();
        assert_eq!(found.len(), MAX_SCS_DEVICES);

        let bus = ports.iter().map(|p| device(0x0403, 0xD010, *p)).collect();
        let found = discovery(bus, root.path())
            .with_max_devices(2)
            .discover()
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_unavailable_bus_fails() {
        let discovery = Discovery::new(BrokenBus, TtyResolver::default());
        assert!(matches!(
            discovery.discover(),
            Err(DiscoveryError::Unavailable { .. })
        ));
    }
}
