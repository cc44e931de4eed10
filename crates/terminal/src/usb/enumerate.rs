//! USB device listing
//!
//! The listing is a trait so discovery can run against a fixed set of
//! devices in tests. [`RusbEnumerator`] is the libusb backed implementation.

use rusb::{Context, UsbContext};
use std::fmt;
use tracing::debug;

use super::discovery::DiscoveryError;

/// Topological address of a USB device: bus number plus the chain of hub
/// port numbers leading to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbAddress {
    pub bus: u8,
    pub ports: Vec<u8>,
}

impl UsbAddress {
    pub fn new(bus: u8, ports: Vec<u8>) -> Self {
        Self { bus, ports }
    }

    /// Kernel name of the device, e.g. `1-1.4` for bus 1, ports 1 then 4
    ///
    /// `None` for a device without ports (a root hub).
    pub fn kernel_name(&self) -> Option<String> {
        if self.ports.is_empty() {
            return None;
        }

        let chain: Vec<String> = self.ports.iter().map(u8::to_string).collect();
        Some(format!("{}-{}", self.bus, chain.join(".")))
    }
}

impl fmt::Display for UsbAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kernel_name() {
            Some(name) => f.write_str(&name),
            None => write!(f, "{}-(root)", self.bus),
        }
    }
}

/// One attached USB device as seen by a single enumeration pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub address: UsbAddress,
}

/// Capability to list the currently attached USB devices
pub trait UsbEnumerator {
    /// List attached devices in enumeration order
    fn attached(&self) -> Result<Vec<AttachedDevice>, DiscoveryError>;
}

/// Lists devices through libusb
///
/// Each call creates and tears down its own libusb context, so nothing is
/// held between discovery passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RusbEnumerator;

impl UsbEnumerator for RusbEnumerator {
    fn attached(&self) -> Result<Vec<AttachedDevice>, DiscoveryError> {
        let context = Context::new().map_err(|source| DiscoveryError::Unavailable {
            what: "unable to initialize libusb",
            source,
        })?;

        let list = context
            .devices()
            .map_err(|source| DiscoveryError::Unavailable {
                what: "error getting device list",
                source,
            })?;

        let mut devices = Vec::with_capacity(list.len());
        for device in list.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    debug!(
                        "Skipping device bus={} addr={}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            let ports = device.port_numbers().unwrap_or_else(|e| {
                debug!(
                    "No port numbers for bus={} addr={}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                Vec::new()
            });

            devices.push(AttachedDevice {
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
                address: UsbAddress::new(device.bus_number(), ports),
            });
        }

        debug!("Enumerated {} USB devices", devices.len());

        // `list` and `context` drop here, freeing the libusb device list
        // and exiting the context
        Ok(devices)
    }
}
