//! Run identity, verdict status, and the metrics record every worker writes
//! into during a run.
//!
//! Timestamps are seconds relative to the run's start (`total_start` is
//! always 0).  Only fields that were actually reached are populated, so an
//! aborted run has no analysis timestamps.

use core::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::control::worker::lock_unpoisoned;

// ───────────────────────────────────────────────────────────────
// Run id
// ───────────────────────────────────────────────────────────────

/// Wall-clock run identifier, `YYYY-MM-DD HH:MM:SS.mmm` in local time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn now() -> Self {
        Self(
            chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S%.3f")
                .to_string(),
        )
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename-safe form: `:` and `.` become `-`, spaces become `_`.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| match c {
                ':' | '.' => '-',
                ' ' => '_',
                other => other,
            })
            .collect()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ───────────────────────────────────────────────────────────────
// Status
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Passed,
    Failed,
    AbortedSealWarning,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::AbortedSealWarning => "ABORTED_SEAL_WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ───────────────────────────────────────────────────────────────
// Metrics record
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: Option<RunId>,
    pub status: Option<RunStatus>,

    // --- Timestamps (seconds since run start) ---
    pub total_start: f64,
    pub total_end: Option<f64>,
    pub baseline_start: Option<f64>,
    pub baseline_end: Option<f64>,
    pub analysis_start: Option<f64>,
    pub analysis_end: Option<f64>,
    /// Seconds from analysis start to the first frame above threshold.
    pub first_exceed_time: Option<f64>,

    // --- Threshold model ---
    /// Finite baseline means the model was estimated from.
    pub baseline_samples: usize,
    pub baseline_mean: Option<f32>,
    pub baseline_quantile: Option<f32>,
    pub baseline_std: Option<f32>,
    pub guard_band: Option<f32>,
    pub effective_threshold: Option<f32>,
    /// Fail-safe threshold applied because no baseline sample was usable.
    pub baseline_fallback: bool,

    // --- Analysis ---
    pub max_brightness: f32,
    pub pct_above_threshold: Option<f32>,
    pub heatmap_png_path: Option<PathBuf>,

    // --- Counters ---
    pub frames_total: u64,
    pub frames_baseline: u64,
    pub frames_analysis: u64,
    pub baseline_misses: u32,
    pub read_errors: u64,

    // --- Actuation ---
    pub rotation_time_accum: f64,
    pub mist_time: f64,
    pub actuator_errors: u32,
    /// Rotation was skipped because the rotational actuator failed to init.
    pub actuator_degraded: bool,
}

impl RunMetrics {
    pub fn total_time(&self) -> Option<f64> {
        self.total_end.map(|end| end - self.total_start)
    }

    pub fn baseline_time(&self) -> Option<f64> {
        Some(self.baseline_end? - self.baseline_start?)
    }

    pub fn analysis_time(&self) -> Option<f64> {
        Some(self.analysis_end? - self.analysis_start?)
    }
}

/// Metrics record shared by every worker of one run.
#[derive(Clone)]
pub struct SharedMetrics {
    inner: Arc<Mutex<RunMetrics>>,
    origin: Instant,
}

impl SharedMetrics {
    pub fn new(run_id: RunId) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunMetrics {
                run_id: Some(run_id),
                ..RunMetrics::default()
            })),
            origin: Instant::now(),
        }
    }

    /// Seconds since the run started.
    pub fn elapsed_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Mutate the record under the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut RunMetrics) -> R) -> R {
        f(&mut lock_unpoisoned(&self.inner))
    }

    pub fn snapshot(&self) -> RunMetrics {
        lock_unpoisoned(&self.inner).clone()
    }
}
