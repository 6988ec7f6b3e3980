//! SIGINT handling.
//!
//! The first Ctrl-C requests cancellation: the action in flight finishes,
//! the rest are reported as skipped and the report is still written. A
//! second Ctrl-C exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};

static CANCELLED: AtomicBool = AtomicBool::new(false);

/// Exit status for a run killed by a second interrupt
const INTERRUPTED_EXIT: libc::c_int = 130;

extern "C" fn on_sigint(_signal: libc::c_int) {
    // Only async-signal-safe operations here: an atomic swap and _exit.
    if CANCELLED.swap(true, Ordering::SeqCst) {
        // SAFETY: _exit is async-signal-safe.
        unsafe { libc::_exit(INTERRUPTED_EXIT) };
    }
}

/// Install the handler and return the flag it sets
pub fn install() -> &'static AtomicBool {
    let handler = on_sigint as extern "C" fn(libc::c_int);
    // SAFETY: the handler only touches an atomic and calls _exit.
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        log::warn!(
            "Could not install SIGINT handler: {}",
            std::io::Error::last_os_error()
        );
    }
    &CANCELLED
}
