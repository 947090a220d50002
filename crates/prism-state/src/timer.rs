//! One-shot cancellable timers on worker threads.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// A one-shot timer that runs a callback on a worker thread after a delay.
///
/// Cancelling (or dropping) the handle before the delay elapses prevents the
/// callback from running. Replacing a stored `OneShot` therefore resets the
/// timer, which is the behavior debounce and expiration rescheduling rely on.
///
/// The callback is invoked with no locks held by the timer itself.
pub(crate) struct OneShot {
    cancel: Sender<()>,
}

impl OneShot {
    /// Start a timer that runs `f` after `delay` unless cancelled first.
    pub(crate) fn spawn(delay: Duration, f: impl FnOnce() + Send + 'static) -> Self {
        let (cancel, armed) = mpsc::channel::<()>();
        thread::spawn(move || {
            // Timeout means the delay elapsed with no cancel signal; any
            // message or a disconnect is a cancellation.
            if let Err(RecvTimeoutError::Timeout) = armed.recv_timeout(delay) {
                f();
            }
        });
        Self { cancel }
    }

    /// Cancel the timer. A timer whose callback has not started will never
    /// run it; a callback already past the decision point completes.
    pub(crate) fn cancel(&self) {
        let _ = self.cancel.send(());
    }
}

impl Drop for OneShot {
    fn drop(&mut self) {
        // Dropping the sender disconnects the worker, which treats it as a
        // cancellation. Explicit for clarity; the channel would do this
        // implicitly anyway.
        let _ = self.cancel.send(());
    }
}
