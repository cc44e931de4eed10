//! Serial line access
//!
//! The modems run 8N1 with RTS/CTS flow control at a fixed, model specific
//! rate. The P4dragon rates (829440 baud) are not standard `Bxxx` values, so
//! the rate goes through serialport, which uses `termios2`/`BOTHER` on Linux.

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::termios::{
    self, ControlFlags, InputFlags, SetArg, SpecialCharacterIndices, Termios,
};
use serialport::{FlowControl, SerialPort, TTYPort};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{FromRawFd, IntoRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("tcgetattr: {0}")]
    GetAttributes(#[source] Errno),

    #[error("tcsetattr: {0}")]
    SetAttributes(#[source] Errno),

    #[error("cannot duplicate descriptor: {0}")]
    Duplicate(#[source] io::Error),

    #[error("cannot set line speed: {0}")]
    Speed(#[source] serialport::Error),
}

/// Applies line settings to an open serial device
pub trait LineConfigurator {
    fn configure(&self, device: &File, baud: u32) -> Result<(), SerialError>;
}

/// Raw 8N1 line with hardware flow control
#[derive(Debug, Default, Clone, Copy)]
pub struct RawLine;

impl LineConfigurator for RawLine {
    fn configure(&self, device: &File, baud: u32) -> Result<(), SerialError> {
        let mut settings = termios::tcgetattr(device).map_err(SerialError::GetAttributes)?;
        make_raw(&mut settings);
        termios::tcsetattr(device, SetArg::TCSANOW, &settings)
            .map_err(SerialError::SetAttributes)?;

        // TTYPort closes its descriptor on drop, so hand it a duplicate
        let fd = device
            .try_clone()
            .map_err(SerialError::Duplicate)?
            .into_raw_fd();
        // SAFETY: `fd` is a freshly duplicated descriptor owned by nobody else
        let mut port = unsafe { TTYPort::from_raw_fd(fd) };
        port.set_flow_control(FlowControl::Hardware)
            .map_err(SerialError::Speed)?;
        port.set_baud_rate(baud).map_err(SerialError::Speed)?;

        debug!("Line configured: {} baud, 8N1, RTS/CTS", baud);
        Ok(())
    }
}

/// Raw mode: no input processing, no echo, one byte satisfies a read
fn make_raw(settings: &mut Termios) {
    termios::cfmakeraw(settings);

    settings.input_flags = InputFlags::IGNBRK;
    settings.control_flags &= !(ControlFlags::CSIZE
        | ControlFlags::CSTOPB
        | ControlFlags::PARENB
        | ControlFlags::PARODD
        | ControlFlags::HUPCL);
    settings.control_flags |= ControlFlags::CS8 | ControlFlags::CREAD | ControlFlags::CLOCAL;

    settings.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    settings.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
}

/// Open a serial device for reading and writing
///
/// The device never becomes the controlling terminal of this process.
pub fn open_device(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(OFlag::O_NOCTTY.bits())
        .open(path)
}

/// Close a device, reporting the result of `close(2)`
pub fn close_device(device: File) -> nix::Result<()> {
    nix::unistd::close(device.into_raw_fd())
}
