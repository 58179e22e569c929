//! Process signal plumbing.
//!
//! Operator interrupts become an [`Event::Interrupt`] on the run loop
//! channel so flows can wind down in order: stop the loop, close the
//! connection, cancel timers. A watchdog forces the process out if that
//! orderly exit stalls.

use std::sync::mpsc::Sender;

use foldctl_client::Event;

#[cfg(unix)]
use std::io;
#[cfg(unix)]
use std::thread;
#[cfg(unix)]
use std::time::Duration;

/// Grace period between the interrupt and the forced exit.
#[cfg(unix)]
const WATCHDOG_GRACE: Duration = Duration::from_secs(10);

/// Errors raised while installing signal handlers.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Registration with the OS failed.
    #[cfg(unix)]
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Routes termination signals into the run loop and arms the watchdog.
///
/// SIGPIPE and SIGHUP are ignored: a vanished pipe reader or terminal must
/// not kill a flow that is mid-exchange with the daemon.
///
/// # Errors
///
/// Returns [`SignalError`] when handler registration fails.
#[cfg(unix)]
pub fn install(events: Sender<Event>) -> Result<(), SignalError> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGPIPE, SIGTERM};
    use signal_hook::iterator::Signals;

    for ignored in [SIGPIPE, SIGHUP] {
        // SAFETY: the emptiness of the handler is the point; registering a
        // no-op action is async-signal-safe.
        unsafe {
            signal_hook::low_level::register(ignored, || {})
                .map_err(|source| SignalError::Install { source })?;
        }
    }

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).map_err(|source| SignalError::Install { source })?;
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            tracing::debug!(signal, "termination signal received");
            let _ = events.send(Event::Interrupt);
            // Watchdog: if the orderly stop has not exited the process by
            // the end of the grace period, force it.
            thread::sleep(WATCHDOG_GRACE);
            std::process::exit(1);
        }
    });
    Ok(())
}

/// Signal routing is a Unix concern; elsewhere this is a no-op.
#[cfg(not(unix))]
pub fn install(_events: Sender<Event>) -> Result<(), SignalError> {
    Ok(())
}
