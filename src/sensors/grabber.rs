//! Background frame grabber and the single-slot "latest frame" handoff.
//!
//! ```text
//!   FrameSource ──read()──▶ FrameGrabber ──publish()──▶ FrameSlot ──latest()──▶ consumers
//! ```
//!
//! The grabber never raises: open and read failures are counted, logged at
//! debug level, and retried after a short back-off until the run's
//! [`StopSignal`] fires.  Consumers never block on acquisition; they take
//! whatever frame is current and may see the same frame twice.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::app::ports::FrameSource;
use crate::control::worker::{StopSignal, Worker, lock_unpoisoned};
use crate::sensors::Frame;

// ───────────────────────────────────────────────────────────────
// FrameSlot
// ───────────────────────────────────────────────────────────────

/// Most recent frame, replaced atomically as a whole.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<Arc<Frame>>>>,
    published: Arc<AtomicU64>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame.  Returns the publish sequence number.
    pub fn publish(&self, frame: Frame) -> u64 {
        *lock_unpoisoned(&self.inner) = Some(Arc::new(frame));
        self.published.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Snapshot of the current frame, if any.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        lock_unpoisoned(&self.inner).clone()
    }

    /// Forget the current frame.
    pub fn clear(&self) {
        *lock_unpoisoned(&self.inner) = None;
    }

    /// Total frames ever published to this slot.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────────
// Counters
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct GrabCounters {
    frames: AtomicU64,
    errors: AtomicU64,
}

/// Frames grabbed and failed acquisitions since the grabber started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrabStats {
    pub frames: u64,
    pub errors: u64,
}

/// Grabber timing.
#[derive(Debug, Clone, Copy)]
pub struct GrabTiming {
    /// Pause after a successful grab.
    pub interval: Duration,
    /// Pause after a failed open or read.
    pub retry_backoff: Duration,
}

// ───────────────────────────────────────────────────────────────
// FrameGrabber
// ───────────────────────────────────────────────────────────────

/// A running grabber thread that owns the frame source until stopped.
pub struct FrameGrabber<F> {
    worker: Worker<F>,
    stop: StopSignal,
    counters: Arc<GrabCounters>,
}

impl<F: FrameSource + Send + 'static> FrameGrabber<F> {
    /// Clear `slot` and start grabbing into it until `stop` fires.
    ///
    /// The slot is cleared first so no frame from before this grabber
    /// started is ever observed through it.
    pub fn spawn(
        mut source: F,
        slot: FrameSlot,
        timing: GrabTiming,
        stop: StopSignal,
    ) -> std::io::Result<Self> {
        slot.clear();
        let counters = Arc::new(GrabCounters::default());
        let thread_counters = Arc::clone(&counters);
        let thread_stop = stop.clone();
        let worker = Worker::spawn("frame-grabber", move || {
            grab_loop(&mut source, &slot, timing, &thread_stop, &thread_counters);
            source.close();
            source
        })?;
        Ok(Self {
            worker,
            stop,
            counters,
        })
    }
}

impl<F> FrameGrabber<F> {
    pub fn stats(&self) -> GrabStats {
        GrabStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Fire the stop signal and wait up to `timeout` for the source to
    /// come back.  `None` means the thread is stuck and the source is lost.
    pub fn stop(self, timeout: Duration) -> (Option<F>, GrabStats) {
        self.stop.stop();
        let stats_before_join = Arc::clone(&self.counters);
        let source = self.worker.join_timeout(timeout);
        let stats = GrabStats {
            frames: stats_before_join.frames.load(Ordering::Relaxed),
            errors: stats_before_join.errors.load(Ordering::Relaxed),
        };
        info!(
            "frame grabber stopped: {} frames, {} errors",
            stats.frames, stats.errors
        );
        (source, stats)
    }
}

fn grab_loop<F: FrameSource>(
    source: &mut F,
    slot: &FrameSlot,
    timing: GrabTiming,
    stop: &StopSignal,
    counters: &GrabCounters,
) {
    let mut opened = false;
    while !stop.is_stopped() {
        if !opened {
            match source.open() {
                Ok(()) => {
                    debug!("frame source opened");
                    opened = true;
                }
                Err(e) => {
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                    debug!("frame source open failed: {e}");
                    if stop.wait(timing.retry_backoff) {
                        break;
                    }
                    continue;
                }
            }
        }

        match source.read() {
            Ok(frame) => {
                slot.publish(frame);
                counters.frames.fetch_add(1, Ordering::Relaxed);
                if stop.wait(timing.interval) {
                    break;
                }
            }
            Err(e) => {
                let errors = counters.errors.fetch_add(1, Ordering::Relaxed) + 1;
                if errors.is_power_of_two() {
                    warn!("frame read failed ({errors} so far): {e}");
                } else {
                    debug!("frame read failed: {e}");
                }
                if stop.wait(timing.retry_backoff) {
                    break;
                }
            }
        }
    }
}
