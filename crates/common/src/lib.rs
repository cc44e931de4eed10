//! Common building blocks for scs-term
//!
//! This crate holds the parts of the terminal that do not touch USB or the
//! serial line directly: the SCS model catalog, UUCP style device lock
//! files, error types and logging setup.

pub mod catalog;
pub mod error;
pub mod lock;
pub mod logging;

pub use catalog::{MODELS, ModelProfile, is_scs_modem, model_code, profile};
pub use error::{Error, LockError, Result};
pub use lock::{DeviceLock, LockStore, ProcessProbe, SignalProbe};
pub use logging::setup_logging;
