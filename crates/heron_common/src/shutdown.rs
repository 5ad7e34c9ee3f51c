//! Cooperative shutdown signal for site and background threads.
//!
//! A site runner idles between empty polls; a bare `thread::sleep` there
//! would delay shutdown by up to the full sleep interval. `ShutdownSignal`
//! gives the loop a stop-aware wait: `wait_timeout` returns early the
//! moment `shutdown()` is called from the control plane.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A cooperative shutdown signal. Cloning shares the underlying state.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    // The flag lives inside the mutex so a waiter can never miss a
    // notification between checking the flag and parking.
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl ShutdownSignal {
    /// Create a new signal in the running (non-shutdown) state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                stopped: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Request shutdown. All current and future waiters wake immediately.
    pub fn shutdown(&self) {
        let mut stopped = self.inner.stopped.lock().unwrap_or_else(|e| e.into_inner());
        *stopped = true;
        self.inner.condvar.notify_all();
    }

    /// Check whether shutdown has been requested (non-blocking).
    pub fn is_shutdown(&self) -> bool {
        *self.inner.stopped.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for at most `duration`, waking early on `shutdown()`.
    /// Returns `true` if shutdown was requested (caller should exit its loop).
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let stopped = self.inner.stopped.lock().unwrap_or_else(|e| e.into_inner());
        let (stopped, _timeout) = self
            .inner
            .condvar
            .wait_timeout_while(stopped, duration, |stopped| !*stopped)
            .unwrap_or_else(|e| e.into_inner());
        *stopped
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
