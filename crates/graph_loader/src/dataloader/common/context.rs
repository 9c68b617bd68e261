//! Per-pass state shared between the loader and its workers.
//!
//! A `PassContext` bundles the cancellation flag, the first-error-wins failure
//! slot and the polling interval. Every blocking wait in a worker is bounded by
//! the polling interval and re-checks the flag in between, so raising it is
//! enough to make all workers return.

use crossbeam_channel::{SendTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone)]
pub(crate) struct PassContext {
    cancel: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<anyhow::Error>>>,
    poll_interval: Duration,
}

impl PassContext {
    pub(crate) fn new(poll_interval: Duration) -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            failure: Arc::new(Mutex::new(None)),
            poll_interval,
        }
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Records `err` unless an earlier failure is already stored, then cancels the pass.
    pub(crate) fn fail(&self, err: anyhow::Error) {
        {
            let mut slot = self.failure.lock();
            if slot.is_none() {
                *slot = Some(err);
            } else {
                debug!(error = %err, "Dropping secondary worker failure");
            }
        }
        self.cancel();
    }

    pub(crate) fn take_failure(&self) -> Option<anyhow::Error> {
        self.failure.lock().take()
    }

    /// Sends `item`, retrying until it is accepted, the pass is cancelled or the
    /// receiver is gone. Returns whether the item was delivered.
    pub(crate) fn send<T>(&self, tx: &Sender<T>, mut item: T) -> bool {
        loop {
            match tx.send_timeout(item, self.poll_interval) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(back)) => {
                    if self.is_cancelled() {
                        return false;
                    }
                    item = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    /// Sleeps for `duration` in polling-interval slices. Returns `false` if the
    /// pass was cancelled meanwhile.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}
