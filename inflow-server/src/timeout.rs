//! Per-session idle-timeout supervisor.
//!
//! Every session owns one supervisor task. Mutating operations push a
//! [`TimerCmd::Reset`] through a bounded channel; the task re-arms its sleep
//! on every reset and, if the sleep ever fires, cancels and cleans up the
//! session on behalf of the vanished client.
//!
//! Resets use `try_send` so no session operation can block on its own timer.
//! A full or closed channel degrades to a missed reset, which at worst makes
//! the timeout fire one period early — never a deadlock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

// ---

use crate::session::UploadSession;

/// Grace period for the backend-notification POST when the timeout fires.
const FIRE_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// IdleTimer
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum TimerCmd {
    /// Re-arm the timer with a new quiet period.
    Reset(Duration),

    /// Stop the supervisor without firing. Sent during cleanup.
    Shutdown,
}

// ---

/// Handle through which a session talks to its supervisor task.
#[derive(Debug, Clone)]
pub(crate) struct IdleTimer {
    tx: mpsc::Sender<TimerCmd>,
}

// ---

impl IdleTimer {
    // ---
    pub fn channel() -> (Self, mpsc::Receiver<TimerCmd>) {
        let (tx, rx) = mpsc::channel(16);
        (Self { tx }, rx)
    }

    // ---

    /// Push the deadline out by `quiet`. Never blocks; a dead supervisor
    /// makes this a no-op.
    pub fn reset(&self, quiet: Duration) {
        let _ = self.tx.try_send(TimerCmd::Reset(quiet));
    }

    // ---

    pub fn shutdown(&self) {
        let _ = self.tx.try_send(TimerCmd::Shutdown);
    }
}

// ---------------------------------------------------------------------------
// Supervisor task
// ---------------------------------------------------------------------------

/// Spawn the supervisor for `session`.
///
/// A zero `quiet` period disarms the timer until a reset arrives with a
/// non-zero one.
pub(crate) fn spawn(session: Arc<UploadSession>, quiet: Duration, mut rx: mpsc::Receiver<TimerCmd>) {
    tokio::spawn(async move {
        let mut quiet = quiet;
        loop {
            let expire = async {
                if quiet.is_zero() {
                    std::future::pending::<()>().await
                } else {
                    tokio::time::sleep(quiet).await
                }
            };

            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(TimerCmd::Reset(d)) => quiet = d,
                    Some(TimerCmd::Shutdown) | None => {
                        tracing::debug!(id = %session.id(), "idle supervisor retires");
                        return;
                    }
                },
                _ = expire => {
                    // Fired: swallow any late resets, then reap the session.
                    rx.close();
                    tracing::warn!(
                        id = %session.id(),
                        quiet_s = quiet.as_secs(),
                        "upload idle for too long, cancelling",
                    );
                    if let Err(e) = session.cancel(true, "upload timed out", FIRE_NOTIFY_TIMEOUT).await {
                        tracing::warn!(id = %session.id(), "timeout cancel: {e}");
                    }
                    if let Err(e) = session.clean_up().await {
                        tracing::warn!(id = %session.id(), "timeout cleanup: {e}");
                    }
                    return;
                }
            }
        }
    });
}
