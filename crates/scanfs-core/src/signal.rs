//! Termination-signal interception.
//!
//! The handler only raises a flag. All kernel resources are mutated from
//! the main sequential flow, so teardown never happens in signal context;
//! the flag is checked at step boundaries and funnels into the normal
//! cleanup path (or the `--clean` discovery path on the next invocation).

use scanfs_common::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle(_signo: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install handlers for the signals that can terminate a run.
pub fn install_handlers() {
    let handler = handle as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        libc::signal(libc::SIGHUP, handler as libc::sighandler_t);
    }
}

/// Whether a termination signal has been received.
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Step-boundary check: error out if a termination signal arrived.
pub fn check_interrupted() -> Result<()> {
    if interrupted() {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}

/// Reset the flag (tests only; the flag is process-wide).
#[doc(hidden)]
pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Raise the flag as a signal would (tests only).
#[doc(hidden)]
pub fn raise() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}
