//! Test configuration parameters
//!
//! All tunable parameters for a contamination test run.
//! Values can be overridden from a JSON file via [`ConfigPort`](crate::app::ports::ConfigPort).

use core::time::Duration;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the mist relay and the rotational actuator are choreographed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuationStrategy {
    /// Mist pulse first, then `rotations` quarter turns separated by
    /// `rotation_delay_ms`.  Each phase is timed on its own.
    Sequential,
    /// Relay held for `mist_duration_ms` while the rotor performs evenly
    /// spaced partial rotations inside that same window.
    Concurrent,
}

/// Whether the analysis window starts after actuation has joined or at the
/// same instant as the actuator coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSchedule {
    AfterActuation,
    AlongsideActuation,
}

/// Rectangular region of interest in native sensor pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Core test configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    // --- Baseline ---
    /// Length of the baseline sampling window (milliseconds)
    pub baseline_duration_ms: u32,
    /// Period between baseline samples (milliseconds)
    pub baseline_sample_period_ms: u32,
    /// Lower bound on the number of baseline sampling attempts
    pub min_baseline_samples: usize,

    // --- Threshold ---
    /// Percentile (95.0–99.5) of the baseline means used as the baseline statistic
    pub baseline_quantile: f32,
    /// Absolute floor of the guard band (brightness counts)
    pub guard_abs_floor: f32,
    /// Multiplier applied to the baseline standard deviation
    pub guard_sigma_multiplier: f32,
    /// Maximum representable brightness (255 for 8-bit sensors)
    pub brightness_max: f32,
    /// Baseline quantile at or above which the run aborts with a seal warning
    pub ambient_abort_bound: Option<f32>,

    // --- Actuation ---
    pub strategy: ActuationStrategy,
    pub analysis_schedule: AnalysisSchedule,
    /// Mist relay pulse length (milliseconds)
    pub mist_duration_ms: u32,
    /// Revolutions performed inside the mist window (concurrent strategy)
    pub revolutions: f32,
    /// Partial rotations per full revolution
    pub segments_per_revolution: u32,
    /// Quarter turns performed after the mist pulse (sequential strategy)
    pub rotations: u32,
    /// Pause between quarter turns (milliseconds)
    pub rotation_delay_ms: u32,

    // --- Analysis ---
    /// Floor on the analysis window length (milliseconds)
    pub analysis_min_duration_ms: u32,
    /// Analyzer poll interval (milliseconds)
    pub analysis_poll_ms: u32,
    /// Region used for the per-frame mean; full frame when `None`
    pub roi: Option<Roi>,
    /// Directory for heatmap PNGs; no artifact is written when `None`
    pub heatmap_dir: Option<PathBuf>,

    // --- Frame grabber ---
    /// Pause between successful grabs (milliseconds)
    pub grab_interval_ms: u32,
    /// Back-off after a failed grab (milliseconds)
    pub grab_retry_backoff_ms: u32,

    // --- Supervision ---
    /// Hard limit when joining a worker that was asked to stop (milliseconds)
    pub join_timeout_ms: u32,
    /// Time allowed for one blocking rotor segment before the actuator
    /// worker is considered stuck (milliseconds)
    pub rotor_segment_timeout_ms: u32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            // Baseline
            baseline_duration_ms: 2000,
            baseline_sample_period_ms: 50, // 20 Hz
            min_baseline_samples: 5,

            // Threshold (mean domain, 0–255 scale)
            baseline_quantile: 99.5,
            guard_abs_floor: 5.0,
            guard_sigma_multiplier: 3.0,
            brightness_max: 255.0,
            ambient_abort_bound: Some(1.0),

            // Actuation
            strategy: ActuationStrategy::Concurrent,
            analysis_schedule: AnalysisSchedule::AfterActuation,
            mist_duration_ms: 3000,
            revolutions: 1.0,
            segments_per_revolution: 4,
            rotations: 4,
            rotation_delay_ms: 3000,

            // Analysis
            analysis_min_duration_ms: 2000,
            analysis_poll_ms: 50,
            roi: None,
            heatmap_dir: None,

            // Frame grabber
            grab_interval_ms: 10,
            grab_retry_backoff_ms: 20,

            // Supervision
            join_timeout_ms: 1000,
            rotor_segment_timeout_ms: 5000,
        }
    }
}

impl TestConfig {
    /// Reject values that would make a run meaningless or hang.
    pub fn validate(&self) -> Result<()> {
        if !(95.0..=99.5).contains(&self.baseline_quantile) {
            return Err(Error::Config("baseline_quantile: must be within 95.0..=99.5"));
        }
        if self.baseline_sample_period_ms == 0 {
            return Err(Error::Config("baseline_sample_period_ms: must be non-zero"));
        }
        if self.min_baseline_samples == 0
            || self.min_baseline_samples > crate::sensors::baseline::MAX_BASELINE_SAMPLES
        {
            return Err(Error::Config("min_baseline_samples: out of range"));
        }
        if !(self.guard_abs_floor >= 0.0) || !(self.guard_sigma_multiplier >= 0.0) {
            return Err(Error::Config("guard band: floor and sigma multiplier must be >= 0"));
        }
        if !(self.brightness_max > 0.0) {
            return Err(Error::Config("brightness_max: must be positive"));
        }
        if self.segments_per_revolution == 0 {
            return Err(Error::Config("segments_per_revolution: must be non-zero"));
        }
        if !(self.revolutions >= 0.0) {
            return Err(Error::Config("revolutions: must be >= 0"));
        }
        if self.analysis_poll_ms == 0 || self.grab_interval_ms == 0 {
            return Err(Error::Config("poll intervals: must be non-zero"));
        }
        if let Some(roi) = self.roi {
            if roi.width == 0 || roi.height == 0 {
                return Err(Error::Config("roi: width and height must be non-zero"));
            }
        }
        Ok(())
    }

    /// Number of baseline sampling attempts: duration / period, floored at
    /// `min_baseline_samples` and capped at the sampler's fixed capacity.
    pub fn baseline_sample_count(&self) -> usize {
        let derived = (self.baseline_duration_ms / self.baseline_sample_period_ms.max(1)) as usize;
        derived
            .max(self.min_baseline_samples)
            .min(crate::sensors::baseline::MAX_BASELINE_SAMPLES)
    }

    /// Analysis window: rotations × inter-rotation delay, never below the floor.
    pub fn analysis_duration(&self) -> Duration {
        let derived = u64::from(self.rotations) * u64::from(self.rotation_delay_ms);
        Duration::from_millis(derived.max(u64::from(self.analysis_min_duration_ms)))
    }

    pub fn baseline_sample_period(&self) -> Duration {
        Duration::from_millis(u64::from(self.baseline_sample_period_ms))
    }

    pub fn mist_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.mist_duration_ms))
    }

    pub fn rotation_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.rotation_delay_ms))
    }

    pub fn analysis_poll(&self) -> Duration {
        Duration::from_millis(u64::from(self.analysis_poll_ms))
    }

    pub fn grab_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.grab_interval_ms))
    }

    pub fn grab_retry_backoff(&self) -> Duration {
        Duration::from_millis(u64::from(self.grab_retry_backoff_ms))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.join_timeout_ms))
    }

    pub fn rotor_segment_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.rotor_segment_timeout_ms))
    }

    /// Partial rotations performed inside the concurrent mist window.
    pub fn concurrent_segments(&self) -> u32 {
        let segments = (self.segments_per_revolution as f32 * self.revolutions).round() as u32;
        segments.max(1)
    }
}
