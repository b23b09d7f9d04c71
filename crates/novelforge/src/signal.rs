//! Wakeable one-shot flags for shutdown and per-job cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

struct Inner {
    flag: AtomicBool,
    // Dropping the sender disconnects every waiting receiver at once.
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

/// A flag that can be set once and waited on with a timeout.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<Inner>,
}

impl Signal {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                tx: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    pub fn set(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        match self.inner.tx.lock() {
            Ok(mut tx) => {
                tx.take();
            }
            Err(poisoned) => {
                poisoned.into_inner().take();
            }
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Sleeps until the signal is set or `timeout` elapses. Returns true
    /// when the signal is set.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        match self.inner.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            Ok(()) | Err(RecvTimeoutError::Timeout) => self.is_set(),
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("set", &self.is_set()).finish()
    }
}

/// Observed when a [`CancelToken`] fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Aborted")]
pub struct Aborted;

/// Cancellation handle passed into every capability call. Fires when
/// either the job itself was cancelled or the scheduler is shutting down.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    job: Signal,
    shutdown: Signal,
}

impl CancelToken {
    pub fn new(job: Signal, shutdown: Signal) -> Self {
        Self { job, shutdown }
    }

    /// A token that never fires unless one of its signals is set by hand.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.job.is_set() || self.shutdown.is_set()
    }

    pub fn check(&self) -> Result<(), Aborted> {
        if self.is_cancelled() {
            Err(Aborted)
        } else {
            Ok(())
        }
    }

    /// Sleeps up to `timeout`, waking early on cancellation. Returns true
    /// when cancelled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let step = Duration::from_millis(50).min(timeout);
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            if self.job.wait(step.min(deadline - now)) {
                return true;
            }
        }
    }
}
