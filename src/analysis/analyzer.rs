//! Analyzer worker: polls the frame slot for the analysis window, tracks the
//! running maximum of per-frame mean brightness, latches the first time it
//! exceeds the effective threshold, and folds every frame into the heatmap.

use core::time::Duration;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, info};

use crate::analysis::heatmap::HeatmapAccumulator;
use crate::app::metrics::SharedMetrics;
use crate::config::{Roi, TestConfig};
use crate::control::worker::{StopSignal, lock_unpoisoned};
use crate::sensors::grabber::FrameSlot;

/// Heatmap shared between the analyzer thread and the orchestrator.
pub type SharedHeatmap = Arc<Mutex<HeatmapAccumulator>>;

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerPlan {
    pub window: Duration,
    pub poll: Duration,
    pub roi: Option<Roi>,
    pub threshold: f32,
}

impl AnalyzerPlan {
    pub fn new(cfg: &TestConfig, threshold: f32) -> Self {
        Self {
            window: cfg.analysis_duration(),
            poll: cfg.analysis_poll(),
            roi: cfg.roi,
            threshold,
        }
    }
}

/// Running result of one analysis window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnalysisSummary {
    pub frames: u64,
    pub max_brightness: f32,
    /// Seconds from window start to the first frame above threshold.
    pub first_exceed_s: Option<f64>,
}

impl AnalysisSummary {
    /// Account for one frame mean observed `elapsed` into the window.
    /// Returns `true` if this frame latched the first-exceed time.
    pub fn observe(&mut self, mean: f32, elapsed: Duration, threshold: f32) -> bool {
        self.frames += 1;
        if mean > self.max_brightness {
            self.max_brightness = mean;
        }
        if self.first_exceed_s.is_none() && mean > threshold {
            self.first_exceed_s = Some(elapsed.as_secs_f64());
            return true;
        }
        false
    }
}

pub struct ContaminationAnalyzer {
    slot: FrameSlot,
    plan: AnalyzerPlan,
    metrics: SharedMetrics,
    heatmap: SharedHeatmap,
}

impl ContaminationAnalyzer {
    pub fn new(slot: FrameSlot, plan: AnalyzerPlan, metrics: SharedMetrics) -> Self {
        Self {
            slot,
            plan,
            metrics,
            heatmap: Arc::new(Mutex::new(HeatmapAccumulator::new())),
        }
    }

    pub fn heatmap(&self) -> SharedHeatmap {
        Arc::clone(&self.heatmap)
    }

    /// Poll until the window elapses or `stop` fires.
    pub fn run(self, stop: &StopSignal) -> AnalysisSummary {
        let started = Instant::now();
        let deadline = started + self.plan.window;
        let t_start = self.metrics.elapsed_secs();
        self.metrics.update(|m| m.analysis_start = Some(t_start));
        info!(
            "analysis window open: {:?}, threshold {:.3}",
            self.plan.window, self.plan.threshold
        );

        let mut summary = AnalysisSummary::default();
        loop {
            if stop.is_stopped() || Instant::now() >= deadline {
                break;
            }
            if let Some(frame) = self.slot.latest() {
                let mean = frame.mean_brightness(self.plan.roi);
                let latched = summary.observe(mean, started.elapsed(), self.plan.threshold);
                lock_unpoisoned(&self.heatmap).accumulate(frame.brightness());
                let snapshot = summary;
                self.metrics.update(|m| {
                    m.frames_total += 1;
                    m.frames_analysis += 1;
                    m.max_brightness = snapshot.max_brightness;
                    m.first_exceed_time = snapshot.first_exceed_s;
                });
                if latched {
                    info!(
                        "threshold exceeded at {:.3}s (mean {:.3})",
                        started.elapsed().as_secs_f64(),
                        mean
                    );
                }
            } else {
                debug!("analyzer: no frame available");
            }
            let wake = (Instant::now() + self.plan.poll).min(deadline);
            if stop.wait_until(wake) {
                break;
            }
        }

        let t_end = self.metrics.elapsed_secs();
        self.metrics.update(|m| m.analysis_end = Some(t_end));
        info!(
            "analysis window closed: {} frames, max {:.3}",
            summary.frames, summary.max_brightness
        );
        summary
    }
}
