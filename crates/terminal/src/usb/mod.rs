//! USB discovery of SCS modems
//!
//! Discovery takes one snapshot of the attached USB devices, keeps the
//! ones with an SCS vendor/product id and maps each of them to the tty
//! node the kernel's FTDI driver created for it.
//!
//! - `enumerate`: the USB listing capability (libusb through rusb)
//! - `sysfs`: topological address to tty node resolution
//! - `discovery`: filtering and classification

pub mod discovery;
pub mod enumerate;
pub mod sysfs;

pub use discovery::{DiscoveredDevice, Discovery, DiscoveryError};
pub use enumerate::{RusbEnumerator, UsbEnumerator};
pub use sysfs::TtyResolver;
