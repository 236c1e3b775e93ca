//! Worker threads, cooperative stop, and bounded joins.
//!
//! Every run-scoped worker (frame grabber, analyzer, actuator coordinator)
//! is an OS thread that watches one shared [`StopSignal`].  Waiting on the
//! signal replaces bare `thread::sleep`: a worker parked between polls wakes
//! as soon as the signal fires, so cancellation latency is bounded by the
//! signal, not by the poll interval.
//!
//! ```text
//!   StopSignal ──(sender dropped)──▶ every clone's receiver disconnects
//!   Worker<T>  ──(result on done channel)──▶ join_timeout()
//! ```

use core::time::Duration;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, warn};

/// Lock a mutex, recovering the data if a worker panicked while holding it.
pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// StopSignal
// ───────────────────────────────────────────────────────────────

/// Run-scoped, cloneable, idempotent stop flag.
///
/// Nothing is ever sent on the channel; stopping drops the only sender,
/// which disconnects every receiver at once.
#[derive(Clone)]
pub struct StopSignal {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    observed: Receiver<()>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(tx))),
            observed: rx,
        }
    }

    /// Request a stop.  Returns `true` only for the call that actually
    /// fired the signal; later calls are no-ops.
    pub fn stop(&self) -> bool {
        lock_unpoisoned(&self.trigger).take().is_some()
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.observed.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Park for up to `timeout`.  Returns `true` if the stop fired.
    pub fn wait(&self, timeout: Duration) -> bool {
        !matches!(
            self.observed.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        )
    }

    /// Park until `deadline`.  Returns `true` if the stop fired first.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        if deadline <= now {
            return self.is_stopped();
        }
        self.wait(deadline - now)
    }
}

// ───────────────────────────────────────────────────────────────
// Worker
// ───────────────────────────────────────────────────────────────

/// Handle to a named worker thread that produces a `T` when it exits.
pub struct Worker<T> {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    done: Receiver<T>,
}

impl<T: Send + 'static> Worker<T> {
    /// Spawn `body` on a dedicated, named OS thread.
    pub fn spawn<F>(name: &'static str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let out = body();
                // The receiver is gone only if the owner gave up on us.
                let _ = tx.send(out);
            })?;
        debug!("worker '{}' spawned", name);
        Ok(Self {
            name,
            handle: Some(handle),
            done: rx,
        })
    }
}

impl<T> Worker<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait up to `timeout` for the worker's result.
    ///
    /// A worker that misses the deadline is detached and `None` is
    /// returned so the caller can keep making progress.
    pub fn join_timeout(mut self, timeout: Duration) -> Option<T> {
        match self.done.recv_timeout(timeout) {
            Ok(out) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                debug!("worker '{}' joined", self.name);
                Some(out)
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "worker '{}' did not finish within {:?}; detaching",
                    self.name, timeout
                );
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("worker '{}' exited without a result (panicked?)", self.name);
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                None
            }
        }
    }
}
