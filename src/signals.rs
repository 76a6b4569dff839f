//! Signal Handling for Watch Mode
//!
//! A single run is short and synchronous, so the default signal behaviour is
//! fine. Watch mode loops forever; SIGINT/SIGTERM set a flag that the loop
//! polls between events so it can return and let `main` exit normally.

use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Set once a shutdown signal has been received
pub static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Install handlers for SIGINT, SIGTERM and SIGQUIT.
///
/// Spawns a daemon thread that dies with the main thread.
pub fn install_signal_handlers() -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGQUIT])?;

    thread::spawn(move || {
        for sig in signals.forever() {
            let name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGQUIT => "SIGQUIT",
                _ => continue,
            };
            tracing::debug!(signal = name, "shutdown signal received");
            eprintln!("\n[jasmine-runner] Received {}, shutting down...", name);
            SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        }
    });

    Ok(())
}

/// Check if shutdown was requested (polled by the watch loop)
#[inline]
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_flag() {
        assert!(!shutdown_requested());
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        assert!(shutdown_requested());
        SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
    }
}
