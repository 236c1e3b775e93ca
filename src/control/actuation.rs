//! Mist relay and rotor choreography.
//!
//! Two strategies are supported:
//!
//! ```text
//!   Sequential:  [relay ON ── mist ── OFF] [rot][delay][rot][delay]…
//!   Concurrent:  [relay ON ─ rot ─ pad ─ rot ─ pad ─ … ─ pad to mist ─ OFF]
//! ```
//!
//! The relay is held by a [`RelayGuard`], so every exit path (normal end,
//! stop request, rotor error, panic unwinding) releases it exactly once.
//! A rotor that fails `init` is skipped: the mist pulse still happens and
//! the run is flagged as degraded.

use core::time::Duration;
use std::time::Instant;

use log::{error, info, warn};

use crate::app::ports::ActuatorDriver;
use crate::config::{ActuationStrategy, TestConfig};
use crate::control::worker::StopSignal;

// ───────────────────────────────────────────────────────────────
// Relay guard
// ───────────────────────────────────────────────────────────────

/// Holds the mist relay energised until released or dropped.
pub struct RelayGuard<'a, A: ActuatorDriver> {
    driver: &'a mut A,
    engaged: bool,
    errors: u32,
}

impl<'a, A: ActuatorDriver> RelayGuard<'a, A> {
    /// Energise the relay.  A failed write is counted; the guard still
    /// attempts the release on drop.
    pub fn engage(driver: &'a mut A) -> Self {
        let mut errors = 0;
        if let Err(e) = driver.set_relay(true) {
            warn!("mist relay on failed: {e}");
            errors += 1;
        }
        Self {
            driver,
            engaged: true,
            errors,
        }
    }

    pub fn driver(&mut self) -> &mut A {
        &mut *self.driver
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    /// Release the relay.  Idempotent.
    pub fn release(&mut self) {
        if !self.engaged {
            return;
        }
        self.engaged = false;
        if let Err(e) = self.driver.set_relay(false) {
            error!("mist relay off failed: {e}");
            self.errors += 1;
        }
    }
}

impl<A: ActuatorDriver> Drop for RelayGuard<'_, A> {
    fn drop(&mut self) {
        self.release();
    }
}

// ───────────────────────────────────────────────────────────────
// Plan and report
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuationPlan {
    pub strategy: ActuationStrategy,
    pub mist: Duration,
    /// Partial rotations inside the mist window (concurrent).
    pub segments: u32,
    /// Rotations after the mist pulse (sequential).
    pub rotations: u32,
    pub rotation_delay: Duration,
    /// Allowance for one blocking rotor segment.
    pub segment_allowance: Duration,
}

impl From<&TestConfig> for ActuationPlan {
    fn from(cfg: &TestConfig) -> Self {
        Self {
            strategy: cfg.strategy,
            mist: cfg.mist_duration(),
            segments: cfg.concurrent_segments(),
            rotations: cfg.rotations,
            rotation_delay: cfg.rotation_delay(),
            segment_allowance: cfg.rotor_segment_timeout(),
        }
    }
}

impl ActuationPlan {
    /// Nominal wall time, excluding rotor motion in the sequential phase.
    pub fn expected_duration(&self) -> Duration {
        match self.strategy {
            ActuationStrategy::Concurrent => self.mist,
            ActuationStrategy::Sequential => self.mist + self.rotation_delay * self.rotations,
        }
    }

    /// How long to wait for the actuator worker before declaring it stuck.
    pub fn join_budget(&self) -> Duration {
        let moves = match self.strategy {
            ActuationStrategy::Concurrent => self.segments,
            ActuationStrategy::Sequential => self.rotations,
        };
        self.expected_duration() + self.segment_allowance * moves
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActuationReport {
    /// Sum of measured rotor motion times.
    pub rotation_time: Duration,
    /// Time the relay was held.
    pub mist_time: Duration,
    pub segments_completed: u32,
    pub errors: u32,
    /// Rotor init failed; only the mist pulse ran.
    pub degraded: bool,
    /// A stop request cut the choreography short.
    pub interrupted: bool,
}

// ───────────────────────────────────────────────────────────────
// Coordinator
// ───────────────────────────────────────────────────────────────

/// Run one full actuation against `driver` according to `plan`.
pub fn actuate<A: ActuatorDriver>(
    driver: &mut A,
    plan: &ActuationPlan,
    stop: &StopSignal,
) -> ActuationReport {
    let mut report = ActuationReport::default();
    if stop.is_stopped() {
        info!("actuation skipped: run already stopped");
        report.interrupted = true;
        return report;
    }

    let rotor_ready = match driver.init() {
        Ok(()) => true,
        Err(e) => {
            warn!("rotational actuator unavailable ({e}); mist only");
            report.degraded = true;
            false
        }
    };

    match plan.strategy {
        ActuationStrategy::Concurrent => concurrent(driver, plan, stop, rotor_ready, &mut report),
        ActuationStrategy::Sequential => sequential(driver, plan, stop, rotor_ready, &mut report),
    }

    driver.cleanup();
    info!(
        "actuation done: mist {:?}, rotation {:?}, {} segments, {} errors{}",
        report.mist_time,
        report.rotation_time,
        report.segments_completed,
        report.errors,
        if report.interrupted { " (interrupted)" } else { "" }
    );
    report
}

fn rotate_once<A: ActuatorDriver>(driver: &mut A, report: &mut ActuationReport) {
    let t0 = Instant::now();
    match driver.rotate_segment() {
        Ok(()) => report.segments_completed += 1,
        Err(e) => {
            warn!("rotation segment failed: {e}");
            report.errors += 1;
        }
    }
    report.rotation_time += t0.elapsed();
}

fn concurrent<A: ActuatorDriver>(
    driver: &mut A,
    plan: &ActuationPlan,
    stop: &StopSignal,
    rotor_ready: bool,
    report: &mut ActuationReport,
) {
    let segments = plan.segments.max(1);
    let interval = plan.mist / segments;
    let start = Instant::now();
    let mut relay = RelayGuard::engage(driver);

    for _ in 0..segments {
        if stop.is_stopped() {
            report.interrupted = true;
            break;
        }
        let seg_start = Instant::now();
        if rotor_ready {
            rotate_once(relay.driver(), report);
        }
        if stop.wait_until(seg_start + interval) {
            report.interrupted = true;
            break;
        }
    }
    if !report.interrupted && stop.wait_until(start + plan.mist) {
        report.interrupted = true;
    }

    relay.release();
    report.mist_time = start.elapsed();
    report.errors += relay.errors();
}

fn sequential<A: ActuatorDriver>(
    driver: &mut A,
    plan: &ActuationPlan,
    stop: &StopSignal,
    rotor_ready: bool,
    report: &mut ActuationReport,
) {
    let start = Instant::now();
    {
        let mut relay = RelayGuard::engage(driver);
        if stop.wait_until(start + plan.mist) {
            report.interrupted = true;
        }
        relay.release();
        report.errors += relay.errors();
    }
    report.mist_time = start.elapsed();

    if report.interrupted || !rotor_ready {
        return;
    }
    for _ in 0..plan.rotations {
        if stop.is_stopped() {
            report.interrupted = true;
            return;
        }
        rotate_once(driver, report);
        if stop.wait(plan.rotation_delay) {
            report.interrupted = true;
            return;
        }
    }
}
