//! Shutdown signals
//!
//! Terminal style signals clear a process wide run flag which the bridge
//! checks between waits.

use nix::libc::c_int;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Signals that end a session
///
/// SIGKILL cannot be caught and is not listed.
pub const SHUTDOWN_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGQUIT,
    Signal::SIGHUP,
    Signal::SIGALRM,
];

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn request_shutdown(_: c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

/// Install the shutdown handlers and return the run flag they clear
///
/// No `SA_RESTART`: a blocked `poll(2)` fails with `EINTR` instead of
/// resuming, so the flag is seen right after the signal.
pub fn install() -> nix::Result<&'static AtomicBool> {
    let action = SigAction::new(
        SigHandler::Handler(request_shutdown),
        SaFlags::empty(),
        SigSet::empty(),
    );

    for signal in SHUTDOWN_SIGNALS {
        // SAFETY: the handler only performs an atomic store
        unsafe { sigaction(signal, &action) }?;
    }

    debug!("Installed handlers for {:?}", SHUTDOWN_SIGNALS);
    Ok(&RUNNING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::raise;

    #[test]
    fn test_alarm_clears_run_flag() {
        let running = install().unwrap();
        assert!(running.load(Ordering::SeqCst));

        raise(Signal::SIGALRM).unwrap();
        assert!(!running.load(Ordering::SeqCst));
    }
}
