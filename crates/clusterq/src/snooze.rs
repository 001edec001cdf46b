//! Cooperative sleep for processors with an empty queue.

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How a snooze ended, which decides whether the caller keeps looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnoozeOutcome {
    /// Slept the full interval (or resumed after a single interrupt).
    Completed,
    /// Snooze time is configured as 0: batch mode, exit when the queue is
    /// empty.
    ExitRequested,
    /// The node-level shutdown token fired mid-sleep.
    Interrupted,
}

/// Which interrupt discipline applies while sleeping.
///
/// Multi-processor nodes snooze cooperatively: an interrupt stops the whole
/// node through the shutdown token, never an individual processor. A
/// single-processor node handles Ctrl-C itself, with a confirmation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnoozeMode {
    Cooperative,
    Interactive,
}

/// Sleep for `seconds`, waking early only if `shutdown` fires.
pub async fn snooze(seconds: u64, shutdown: &CancellationToken) -> SnoozeOutcome {
    if seconds == 0 {
        info!("snooze time is 0; exiting now that the queue is empty");
        return SnoozeOutcome::ExitRequested;
    }

    info!(seconds, "no jobs; snoozing");
    tokio::select! {
        _ = shutdown.cancelled() => SnoozeOutcome::Interrupted,
        _ = sleep(Duration::from_secs(seconds)) => SnoozeOutcome::Completed,
    }
}

/// Sleep for `seconds` handling Ctrl-C directly: the first interrupt prints
/// a notice and opens a 5-second window; a second interrupt within it asks
/// the caller to exit, otherwise the loop resumes.
pub async fn snooze_interactive(seconds: u64) -> SnoozeOutcome {
    if seconds == 0 {
        info!("snooze time is 0; exiting now that the queue is empty");
        return SnoozeOutcome::ExitRequested;
    }

    info!(seconds, "no jobs; snoozing");
    tokio::select! {
        _ = sleep(Duration::from_secs(seconds)) => SnoozeOutcome::Completed,
        _ = tokio::signal::ctrl_c() => {
            warn!("snooze interrupted; interrupt again within 5s to exit");
            tokio::select! {
                _ = sleep(Duration::from_secs(5)) => {
                    info!("resuming");
                    SnoozeOutcome::Completed
                }
                _ = tokio::signal::ctrl_c() => SnoozeOutcome::Interrupted,
            }
        }
    }
}
