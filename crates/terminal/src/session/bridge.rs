//! Duplex copy between the terminal and the modem
//!
//! Single threaded: one `poll(2)` over the device and the terminal input,
//! with no timeout. The run flag is checked before every wait, so a signal
//! that clears it takes effect after at most one wakeup. Handlers are
//! installed without `SA_RESTART`; an interrupted wait returns `EINTR` and
//! the loop goes straight back to the flag.

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, trace};

/// Bytes moved per read
const BUFFER_SIZE: usize = 256;

/// Sent to the modem once before bridging to get a prompt
const WAKE_BYTE: u8 = b'\r';

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("waiting for input failed: {0}")]
    ReadinessWaitFailed(#[source] Errno),

    #[error("device I/O failed: {0}")]
    Device(#[source] io::Error),

    #[error("terminal I/O failed: {0}")]
    Terminal(#[source] io::Error),
}

/// Why a bridge ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// The run flag was cleared
    Cancelled,
    /// End of file on the terminal input
    InputClosed,
    /// End of file on the device
    DeviceClosed,
}

/// Replace a trailing newline with a carriage return
///
/// The modems terminate command lines with CR.
pub fn translate_line_ending(chunk: &mut [u8]) {
    if let Some(last) = chunk.last_mut()
        && *last == b'\n'
    {
        *last = b'\r';
    }
}

/// Copy bytes between `device` and the terminal until `running` is cleared
/// or either side reaches end of file
///
/// When both sides are readable in one wakeup the device is served first.
pub fn run<D, I, O>(
    device: &mut D,
    input: &mut I,
    output: &mut O,
    running: &AtomicBool,
) -> Result<BridgeExit, BridgeError>
where
    D: AsFd + Read + Write,
    I: AsFd + Read,
    O: Write,
{
    device.write_all(&[WAKE_BYTE]).map_err(BridgeError::Device)?;

    let mut buf = [0u8; BUFFER_SIZE];
    loop {
        if !running.load(Ordering::SeqCst) {
            debug!("Run flag cleared, leaving bridge");
            return Ok(BridgeExit::Cancelled);
        }

        let (device_ready, input_ready) = {
            let mut fds = [
                PollFd::new(device.as_fd(), PollFlags::POLLIN),
                PollFd::new(input.as_fd(), PollFlags::POLLIN),
            ];

            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(BridgeError::ReadinessWaitFailed(e)),
            }

            (is_readable(&fds[0]), is_readable(&fds[1]))
        };

        if device_ready {
            match read_chunk(device, &mut buf).map_err(BridgeError::Device)? {
                Some(0) => return Ok(BridgeExit::DeviceClosed),
                Some(n) => {
                    trace!("device -> terminal: {} bytes", n);
                    output.write_all(&buf[..n]).map_err(BridgeError::Terminal)?;
                    output.flush().map_err(BridgeError::Terminal)?;
                }
                None => continue,
            }
        }

        if input_ready {
            match read_chunk(input, &mut buf).map_err(BridgeError::Terminal)? {
                Some(0) => return Ok(BridgeExit::InputClosed),
                Some(n) => {
                    trace!("terminal -> device: {} bytes", n);
                    let chunk = &mut buf[..n];
                    translate_line_ending(chunk);
                    device.write_all(chunk).map_err(BridgeError::Device)?;
                }
                None => continue,
            }
        }
    }
}

/// Readable, or in a state where a read reports EOF or the error
fn is_readable(fd: &PollFd<'_>) -> bool {
    fd.revents().is_some_and(|events| {
        events.intersects(
            PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL,
        )
    })
}

/// One read; `None` when a signal interrupted it
fn read_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<Option<usize>> {
    match source.read(buf) {
        Ok(n) => Ok(Some(n)),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(e),
    }
}
