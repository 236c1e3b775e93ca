//! Baseline sampler: a fixed number of periodic brightness means taken from
//! the frame slot while the chamber is dark.
//!
//! Samples land in a fixed-capacity buffer; the attempt count is capped at
//! [`MAX_BASELINE_SAMPLES`] when the configuration is resolved.  Attempts
//! that find no frame are counted as misses rather than samples, so a dead
//! sensor yields an empty buffer and the threshold estimator's fail-safe.

use core::time::Duration;

use heapless::Vec;
use log::{debug, info, warn};

use crate::app::metrics::SharedMetrics;
use crate::config::{Roi, TestConfig};
use crate::control::worker::StopSignal;
use crate::sensors::grabber::FrameSlot;

/// Upper bound on baseline sampling attempts per run.
pub const MAX_BASELINE_SAMPLES: usize = 512;

/// Brightness means collected during one baseline window.
pub type BaselineSamples = Vec<f32, MAX_BASELINE_SAMPLES>;

/// Resolved baseline schedule.
#[derive(Debug, Clone, Copy)]
pub struct BaselinePlan {
    pub attempts: usize,
    pub period: Duration,
    pub roi: Option<Roi>,
}

impl From<&TestConfig> for BaselinePlan {
    fn from(cfg: &TestConfig) -> Self {
        Self {
            attempts: cfg.baseline_sample_count(),
            period: cfg.baseline_sample_period(),
            roi: cfg.roi,
        }
    }
}

/// Sample the slot `plan.attempts` times, one period apart.
///
/// Ends early if `stop` fires; whatever was collected so far is returned.
pub fn collect(
    slot: &FrameSlot,
    plan: &BaselinePlan,
    stop: &StopSignal,
    metrics: &SharedMetrics,
) -> BaselineSamples {
    let mut samples = BaselineSamples::new();
    let mut misses = 0u32;

    for _ in 0..plan.attempts.min(MAX_BASELINE_SAMPLES) {
        if stop.wait(plan.period) {
            info!("baseline interrupted after {} samples", samples.len());
            break;
        }
        match slot.latest() {
            Some(frame) => {
                let mean = frame.mean_brightness(plan.roi);
                if samples.push(mean).is_err() {
                    break;
                }
                metrics.update(|m| {
                    m.frames_total += 1;
                    m.frames_baseline += 1;
                });
            }
            None => {
                misses += 1;
                debug!("baseline attempt found no frame");
            }
        }
    }

    if misses > 0 {
        warn!(
            "baseline: {} of {} attempts had no frame",
            misses,
            samples.len() as u32 + misses
        );
    }
    metrics.update(|m| m.baseline_misses = misses);
    samples
}
