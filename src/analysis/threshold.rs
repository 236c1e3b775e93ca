//! Adaptive threshold estimation from baseline brightness samples.
//!
//! ```text
//!   q      = percentile(samples, quantile_pct)      (linear interpolation)
//!   σ      = sample standard deviation (n − 1), 0 for a single sample
//!   guard  = max(abs_floor, sigma_multiplier · σ)
//!   thr    = clamp(q + guard, 0, brightness_max)
//! ```
//!
//! With no usable samples the estimator returns the fail-safe model: every
//! statistic pinned to `brightness_max`, so nothing short of saturation can
//! register as contamination.

use serde::Serialize;

use crate::config::TestConfig;

/// Estimator inputs taken from [`TestConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdParams {
    pub quantile_pct: f32,
    pub abs_floor: f32,
    pub sigma_multiplier: f32,
    pub brightness_max: f32,
}

impl From<&TestConfig> for ThresholdParams {
    fn from(cfg: &TestConfig) -> Self {
        Self {
            quantile_pct: cfg.baseline_quantile,
            abs_floor: cfg.guard_abs_floor,
            sigma_multiplier: cfg.guard_sigma_multiplier,
            brightness_max: cfg.brightness_max,
        }
    }
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self::from(&TestConfig::default())
    }
}

/// Result of one baseline estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdModel {
    /// Baseline statistic (the configured percentile of sample means).
    pub baseline_quantile: f32,
    pub baseline_mean: f32,
    pub baseline_std: f32,
    pub guard_band: f32,
    /// Decision boundary: frames brighter than this are contamination.
    pub effective_threshold: f32,
    /// Finite samples that went into the estimate.
    pub sample_count: usize,
    /// `true` when no samples were usable and the fail-safe model applies.
    pub fallback: bool,
}

impl ThresholdModel {
    /// Fail-safe model used when no samples are available.
    pub fn fail_safe(brightness_max: f32) -> Self {
        Self {
            baseline_quantile: brightness_max,
            baseline_mean: brightness_max,
            baseline_std: 0.0,
            guard_band: 0.0,
            effective_threshold: brightness_max,
            sample_count: 0,
            fallback: true,
        }
    }

    /// Whether the baseline is too bright to trust the chamber seal.
    ///
    /// The fail-safe model never trips the bound on its own.
    pub fn exceeds_ambient(&self, bound: Option<f32>) -> bool {
        !self.fallback && bound.is_some_and(|b| self.baseline_quantile >= b)
    }

    /// Strictly greater than the effective threshold.
    pub fn is_exceeded_by(&self, brightness: f32) -> bool {
        brightness > self.effective_threshold
    }
}

/// Estimate the detection threshold from baseline samples.
///
/// Non-finite samples are discarded and the rest clamped to
/// `0..=brightness_max` before any statistic is computed, so the threshold
/// never falls below the baseline quantile.
pub fn estimate(samples: &[f32], params: &ThresholdParams) -> ThresholdModel {
    let mut sorted: Vec<f32> = samples
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, params.brightness_max))
        .collect();
    if sorted.is_empty() {
        return ThresholdModel::fail_safe(params.brightness_max);
    }
    sorted.sort_by(f32::total_cmp);

    let baseline_quantile = percentile(&sorted, params.quantile_pct);
    let baseline_mean =
        (sorted.iter().map(|&s| f64::from(s)).sum::<f64>() / sorted.len() as f64) as f32;
    let baseline_std = sample_std(&sorted);
    let guard_band = params.abs_floor.max(params.sigma_multiplier * baseline_std);
    let effective_threshold = (baseline_quantile + guard_band).clamp(0.0, params.brightness_max);

    ThresholdModel {
        baseline_quantile,
        baseline_mean,
        baseline_std,
        guard_band,
        effective_threshold,
        sample_count: sorted.len(),
        fallback: false,
    }
}

/// Percentile of an ascending, non-empty slice with linear interpolation
/// between closest ranks.  `pct` is clamped to 0–100.
pub fn percentile(sorted: &[f32], pct: f32) -> f32 {
    match sorted.len() {
        0 => return 0.0,
        1 => return sorted[0],
        _ => {}
    }
    let rank = f64::from(pct.clamp(0.0, 100.0)) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    let a = f64::from(sorted[lo]);
    let b = f64::from(sorted[hi]);
    (a + (b - a) * frac) as f32
}

/// Sample standard deviation with Bessel's correction; 0 for fewer than
/// two samples.
pub fn sample_std(samples: &[f32]) -> f32 {
    let n = samples.len();
    if n < 2 {
        return 0.0;
    }
    let mean = samples.iter().map(|&s| f64::from(s)).sum::<f64>() / n as f64;
    let var = samples
        .iter()
        .map(|&s| {
            let d = f64::from(s) - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1) as f64;
    var.sqrt() as f32
}
