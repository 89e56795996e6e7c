//! SIGINT/SIGTERM handling.
//!
//! The handler only flips the shared stop flag; the monitor notices it at the
//! next pacer check and shuts down cleanly.

use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sleepalert_core::StopFlag;

static STOP_TARGET: OnceCell<Arc<AtomicBool>> = OnceCell::new();

extern "C" fn request_stop(_signum: libc::c_int) {
    if let Some(flag) = STOP_TARGET.get() {
        flag.store(true, Ordering::SeqCst);
    }
}

pub fn install(stop: &StopFlag) -> Result<(), String> {
    STOP_TARGET
        .set(Arc::clone(stop.as_atomic()))
        .map_err(|_| "Signal handlers already installed".to_string())?;

    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler is async-signal-safe; it performs a single atomic store
        // on a flag that is initialized before the handler is registered.
        let previous = unsafe {
            libc::signal(
                signal,
                request_stop as extern "C" fn(libc::c_int) as libc::sighandler_t,
            )
        };
        if previous == libc::SIG_ERR {
            return Err(format!(
                "Failed to install handler for signal {}: {}",
                signal,
                std::io::Error::last_os_error()
            ));
        }
    }
    Ok(())
}
