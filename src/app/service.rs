//! Test service: the hexagonal core.
//!
//! [`TestService`] owns the run state machine, the devices between runs,
//! and the adapters results flow out through.  It exposes a hardware-
//! agnostic API that the GUI boundary (or a CLI, or a test) drives from
//! any thread.
//!
//! ```text
//!  FrameSource ──▶ ┌──────────────────────────────┐ ──▶ RunStore
//!                  │         TestService           │
//! ActuatorDriver ◀─│ FSM · grabber · analyzer · IO │ ──▶ EventSink
//!                  └──────────────────────────────┘
//! ```
//!
//! A run executes on the caller's thread and fans out to three workers
//! (frame grabber, actuator coordinator, analyzer) that share one
//! run-scoped [`StopSignal`].  Devices are moved into the workers and
//! handed back on join; a worker that misses its join deadline keeps its
//! device and the next run reports [`Error::DeviceLost`].
//!
//! A run that cannot reach a verdict (cancelled before any frame was
//! analysed, or failed after it began) ends in [`RunState::Errored`] and is
//! still persisted, with status [`RunStatus::Error`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use log::{error, info, warn};

use crate::analysis::analyzer::{AnalysisSummary, AnalyzerPlan, ContaminationAnalyzer};
use crate::analysis::threshold::{self, ThresholdModel, ThresholdParams};
use crate::config::{AnalysisSchedule, TestConfig};
use crate::control::actuation::{ActuationPlan, actuate};
use crate::control::worker::{StopSignal, Worker, lock_unpoisoned};
use crate::error::{Error, Result};
use crate::fsm::{RunFsm, RunState};
use crate::sensors::Frame;
use crate::sensors::baseline::{self, BaselinePlan};
use crate::sensors::grabber::{FrameGrabber, FrameSlot, GrabStats, GrabTiming};

use super::commands::RunCommand;
use super::events::RunEvent;
use super::metrics::{RunId, RunMetrics, RunStatus, SharedMetrics};
use super::ports::{ActuatorDriver, EventSink, FrameSource, RunStore};

/// Everything the caller learns about a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    pub metrics: RunMetrics,
    pub heatmap: Option<PathBuf>,
    /// `false` if the result store rejected the record.
    pub persisted: bool,
}

/// Where the frame source currently lives.
enum SourceHome<F> {
    Docked(F),
    Previewing(FrameGrabber<F>),
    InRun,
    Lost,
}

// ───────────────────────────────────────────────────────────────
// TestService
// ───────────────────────────────────────────────────────────────

pub struct TestService<F, A, S, E> {
    config: Mutex<TestConfig>,
    fsm: RunFsm,
    slot: FrameSlot,
    source: Mutex<SourceHome<F>>,
    actuator: Mutex<Option<A>>,
    store: Mutex<S>,
    sink: Mutex<E>,
    active_stop: Mutex<Option<StopSignal>>,
    last_outcome: Mutex<Option<RunOutcome>>,
}

impl<F, A, S, E> TestService<F, A, S, E>
where
    F: FrameSource + Send + 'static,
    A: ActuatorDriver + Send + 'static,
    S: RunStore,
    E: EventSink,
{
    /// Build the service.  Rejects an invalid configuration.
    pub fn new(config: TestConfig, source: F, actuator: A, store: S, sink: E) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Mutex::new(config),
            fsm: RunFsm::new(),
            slot: FrameSlot::new(),
            source: Mutex::new(SourceHome::Docked(source)),
            actuator: Mutex::new(Some(actuator)),
            store: Mutex::new(store),
            sink: Mutex::new(sink),
            active_stop: Mutex::new(None),
            last_outcome: Mutex::new(None),
        })
    }

    // ── Commands ──────────────────────────────────────────────

    /// Dispatch an external command.  Only `StartTest` yields an outcome.
    pub fn handle_command(&self, cmd: RunCommand) -> Result<Option<RunOutcome>> {
        match cmd {
            RunCommand::StartTest => self.start_test().map(Some),
            RunCommand::Stop => {
                self.stop();
                Ok(None)
            }
            RunCommand::Acknowledge => self.acknowledge().map(|()| None),
            RunCommand::StartPreview => self.start_preview().map(|()| None),
            RunCommand::StopPreview => {
                self.stop_preview();
                Ok(None)
            }
            RunCommand::UpdateConfig(cfg) => self.update_config(cfg).map(|()| None),
        }
    }

    /// Execute one full test run and block until it has a verdict.
    ///
    /// A finished, unacknowledged run is acknowledged implicitly.  Returns
    /// [`Error::Busy`] if a run is already active.  Device and storage
    /// failures are absorbed into the outcome; only a lost device handle
    /// or a thread spawn failure surfaces as an error, after an `ERROR`
    /// record has been handed to the store.
    pub fn start_test(&self) -> Result<RunOutcome> {
        if matches!(
            self.fsm.current(),
            RunState::Decided | RunState::AbortedSealWarning | RunState::Errored
        ) {
            // A racing caller may get here first; try_begin sorts it out.
            let _ = self.advance(RunState::Idle);
        }
        self.fsm.try_begin()?;
        let stop = StopSignal::new();
        *lock_unpoisoned(&self.active_stop) = Some(stop.clone());
        self.emit(&RunEvent::StateChanged {
            from: RunState::Idle,
            to: RunState::Baseline,
        });

        let run_id = RunId::now();
        let metrics = SharedMetrics::new(run_id.clone());
        let result = self.execute_run(&run_id, &metrics, &stop);

        stop.stop();
        lock_unpoisoned(&self.active_stop).take();

        match result {
            Ok(outcome) => {
                *lock_unpoisoned(&self.last_outcome) = Some(outcome.clone());
                Ok(outcome)
            }
            Err(e) => {
                error!("run {} ended without verdict: {e}", run_id);
                if self.advance(RunState::Errored).is_err() {
                    self.fsm.reset();
                }
                let outcome = self.finish(run_id, RunStatus::Error, &metrics, None);
                *lock_unpoisoned(&self.last_outcome) = Some(outcome);
                Err(e)
            }
        }
    }

    /// Cancel the active run.  Idempotent; a no-op when idle.
    pub fn stop(&self) {
        if let Some(stop) = lock_unpoisoned(&self.active_stop).as_ref() {
            if stop.stop() {
                info!("stop requested");
            }
        }
    }

    /// Return a finished run to `Idle`.
    pub fn acknowledge(&self) -> Result<()> {
        self.advance(RunState::Idle)
    }

    /// Stream frames into the preview slot while idle.
    pub fn start_preview(&self) -> Result<()> {
        let timing = grab_timing(&lock_unpoisoned(&self.config));
        let mut home = lock_unpoisoned(&self.source);
        match std::mem::replace(&mut *home, SourceHome::Lost) {
            SourceHome::Docked(source) => {
                match FrameGrabber::spawn(source, self.slot.clone(), timing, StopSignal::new()) {
                    Ok(grabber) => {
                        info!("preview started");
                        *home = SourceHome::Previewing(grabber);
                        Ok(())
                    }
                    Err(e) => {
                        error!("preview grabber spawn failed: {e}");
                        Err(Error::Spawn("preview grabber"))
                    }
                }
            }
            SourceHome::Previewing(grabber) => {
                *home = SourceHome::Previewing(grabber);
                Ok(())
            }
            SourceHome::InRun => {
                *home = SourceHome::InRun;
                Err(Error::Busy)
            }
            SourceHome::Lost => Err(Error::DeviceLost("frame source")),
        }
    }

    /// Stop the preview grabber, if any.
    pub fn stop_preview(&self) {
        let timeout = lock_unpoisoned(&self.config).join_timeout();
        let mut home = lock_unpoisoned(&self.source);
        if matches!(*home, SourceHome::Previewing(_)) {
            if let SourceHome::Previewing(grabber) =
                std::mem::replace(&mut *home, SourceHome::Lost)
            {
                *home = dock(grabber.stop(timeout).0);
                info!("preview stopped");
            }
        }
    }

    /// Replace the configuration used by subsequent runs.
    pub fn update_config(&self, config: TestConfig) -> Result<()> {
        config.validate()?;
        if self.fsm.current().is_active() {
            return Err(Error::Busy);
        }
        *lock_unpoisoned(&self.config) = config;
        info!("configuration updated");
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> RunState {
        self.fsm.current()
    }

    /// Most recent frame from the preview or run grabber.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.slot.latest()
    }

    pub fn last_outcome(&self) -> Option<RunOutcome> {
        lock_unpoisoned(&self.last_outcome).clone()
    }

    pub fn config(&self) -> TestConfig {
        lock_unpoisoned(&self.config).clone()
    }

    // ── Run orchestration ─────────────────────────────────────

    fn execute_run(
        &self,
        run_id: &RunId,
        metrics: &SharedMetrics,
        stop: &StopSignal,
    ) -> Result<RunOutcome> {
        let cfg = lock_unpoisoned(&self.config).clone();
        let run_id = run_id.clone();
        info!("run {} started", run_id);

        // 1. Frame grabber
        let source = self.take_source(cfg.join_timeout())?;
        let grabber =
            FrameGrabber::spawn(source, self.slot.clone(), grab_timing(&cfg), stop.clone())
                .map_err(|e| {
                    error!("frame grabber spawn failed: {e}");
                    *lock_unpoisoned(&self.source) = SourceHome::Lost;
                    Error::Spawn("frame grabber")
                })?;

        // 2. Baseline
        let t = metrics.elapsed_secs();
        metrics.update(|m| m.baseline_start = Some(t));
        let samples = baseline::collect(&self.slot, &BaselinePlan::from(&cfg), stop, metrics);
        let t = metrics.elapsed_secs();
        metrics.update(|m| m.baseline_end = Some(t));

        let model = threshold::estimate(&samples, &ThresholdParams::from(&cfg));
        record_model(metrics, &model);
        if model.fallback {
            warn!(
                "{}; fail-safe threshold {:.1} in force",
                Error::InsufficientBaselineData,
                model.effective_threshold
            );
        } else {
            info!(
                "baseline: q={:.3} std={:.3} guard={:.3} threshold={:.3} (n={})",
                model.baseline_quantile,
                model.baseline_std,
                model.guard_band,
                model.effective_threshold,
                model.sample_count
            );
        }
        self.emit(&RunEvent::BaselineReady(model));

        if stop.is_stopped() {
            warn!("run {} stopped during baseline; nothing actuated", run_id);
            let stats = self.dock_grabber(grabber, &cfg);
            metrics.update(|m| m.read_errors = stats.errors);
            self.advance(RunState::Errored)?;
            return Ok(self.finish(run_id, RunStatus::Error, metrics, None));
        }

        // 3. Ambient sanity gate
        if model.exceeds_ambient(cfg.ambient_abort_bound) {
            warn!(
                "{}: baseline {:.3} >= {:.3}; check the chamber seal",
                Error::AmbientTooBright,
                model.baseline_quantile,
                cfg.ambient_abort_bound.unwrap_or_default()
            );
            let stats = self.dock_grabber(grabber, &cfg);
            metrics.update(|m| m.read_errors = stats.errors);
            self.advance(RunState::AbortedSealWarning)?;
            return Ok(self.finish(run_id, RunStatus::AbortedSealWarning, metrics, None));
        }

        // 4. Actuation
        if let Err(e) = self.advance(RunState::Misting) {
            self.dock_grabber(grabber, &cfg);
            return Err(e);
        }
        let Some(mut actuator) = lock_unpoisoned(&self.actuator).take() else {
            self.dock_grabber(grabber, &cfg);
            return Err(Error::DeviceLost("actuator"));
        };
        let plan = ActuationPlan::from(&cfg);
        let act_stop = stop.clone();
        let act_metrics = metrics.clone();
        let actuation = match Worker::spawn("actuator", move || {
            let report = actuate(&mut actuator, &plan, &act_stop);
            act_metrics.update(|m| {
                m.rotation_time_accum = report.rotation_time.as_secs_f64();
                m.mist_time = report.mist_time.as_secs_f64();
                m.actuator_errors = report.errors;
                m.actuator_degraded = report.degraded;
            });
            actuator
        }) {
            Ok(worker) => worker,
            Err(e) => {
                error!("actuator worker spawn failed: {e}");
                self.dock_grabber(grabber, &cfg);
                return Err(Error::Spawn("actuator"));
            }
        };

        // 5. Analysis, alongside or after actuation
        let analyzer = ContaminationAnalyzer::new(
            self.slot.clone(),
            AnalyzerPlan::new(&cfg, model.effective_threshold),
            metrics.clone(),
        );
        let heatmap = analyzer.heatmap();
        let mut pending = Some(analyzer);
        let mut analysis = None;
        let mut spawn_failure = None;
        if cfg.analysis_schedule == AnalysisSchedule::AlongsideActuation {
            if let Some(a) = pending.take() {
                match spawn_analyzer(a, stop) {
                    Ok(worker) => analysis = Some(worker),
                    Err(e) => {
                        stop.stop();
                        spawn_failure = Some(e);
                    }
                }
            }
        }

        match actuation.join_timeout(plan.join_budget() + cfg.join_timeout()) {
            Some(actuator) => *lock_unpoisoned(&self.actuator) = Some(actuator),
            None => error!("actuator worker stuck; actuator unavailable until it returns"),
        }
        if let Some(e) = spawn_failure {
            self.dock_grabber(grabber, &cfg);
            return Err(e);
        }

        if let Err(e) = self.advance(RunState::Analyzing) {
            self.dock_grabber(grabber, &cfg);
            return Err(e);
        }
        if let Some(a) = pending.take() {
            match spawn_analyzer(a, stop) {
                Ok(worker) => analysis = Some(worker),
                Err(e) => {
                    self.dock_grabber(grabber, &cfg);
                    return Err(e);
                }
            }
        }
        // Sampled before the service raises the signal itself.
        let cancelled = match analysis {
            Some(worker) => {
                let joined = worker
                    .join_timeout(cfg.analysis_duration() + cfg.join_timeout())
                    .is_some();
                let cancelled = stop.is_stopped();
                if !joined {
                    stop.stop();
                    warn!("analyzer did not close its window; deciding on frames so far");
                }
                cancelled
            }
            None => stop.is_stopped(),
        };

        // 6. Wind down and decide
        stop.stop();
        let stats = self.dock_grabber(grabber, &cfg);
        metrics.update(|m| m.read_errors = stats.errors);

        let heatmap_path = {
            let acc = lock_unpoisoned(&heatmap);
            let pct = acc.pct_above(model.effective_threshold);
            metrics.update(|m| m.pct_above_threshold = pct);
            match cfg.heatmap_dir.as_deref() {
                Some(dir) => acc.write_png(dir, &run_id).unwrap_or_else(|e| {
                    warn!("heatmap not written: {e}");
                    None
                }),
                None => None,
            }
        };

        metrics.update(|m| m.heatmap_png_path = heatmap_path.clone());
        let snapshot = metrics.snapshot();
        let status = if cancelled && snapshot.frames_analysis == 0 {
            warn!("run {} stopped before any frame was analysed; no verdict", run_id);
            RunStatus::Error
        } else if model.is_exceeded_by(snapshot.max_brightness) {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        };
        self.advance(if status == RunStatus::Error {
            RunState::Errored
        } else {
            RunState::Decided
        })?;
        Ok(self.finish(run_id, status, metrics, heatmap_path))
    }

    /// Freeze metrics, persist, and announce the verdict.
    fn finish(
        &self,
        run_id: RunId,
        status: RunStatus,
        metrics: &SharedMetrics,
        heatmap: Option<PathBuf>,
    ) -> RunOutcome {
        let t = metrics.elapsed_secs();
        metrics.update(|m| {
            m.total_end = Some(t);
            m.status = Some(status);
        });
        let frozen = metrics.snapshot();

        let persisted = match lock_unpoisoned(&self.store).save_run(&run_id, status, &frozen) {
            Ok(()) => true,
            Err(e) => {
                error!("run {} not persisted: {e}", run_id);
                self.emit(&RunEvent::PersistFailed {
                    run_id: run_id.clone(),
                    reason: e.to_string(),
                });
                false
            }
        };

        info!(
            "run {} verdict {}: max {:.3} vs threshold {:.3}",
            run_id,
            status,
            frozen.max_brightness,
            frozen.effective_threshold.unwrap_or(f32::NAN)
        );
        self.emit(&RunEvent::Verdict {
            run_id: run_id.clone(),
            status,
            max_brightness: frozen.max_brightness,
            effective_threshold: frozen.effective_threshold,
            heatmap: heatmap.clone(),
        });

        RunOutcome {
            run_id,
            status,
            metrics: frozen,
            heatmap,
            persisted,
        }
    }

    // ── Internal ──────────────────────────────────────────────

    /// Transition the FSM and announce it.
    fn advance(&self, to: RunState) -> Result<()> {
        let from = self.fsm.current();
        self.fsm.transition(to)?;
        self.emit(&RunEvent::StateChanged { from, to });
        Ok(())
    }

    fn emit(&self, event: &RunEvent) {
        lock_unpoisoned(&self.sink).emit(event);
    }

    /// Claim the frame source for a run, stopping any preview first.
    fn take_source(&self, timeout: core::time::Duration) -> Result<F> {
        let mut home = lock_unpoisoned(&self.source);
        match std::mem::replace(&mut *home, SourceHome::InRun) {
            SourceHome::Docked(source) => Ok(source),
            SourceHome::Previewing(grabber) => match grabber.stop(timeout).0 {
                Some(source) => Ok(source),
                None => {
                    *home = SourceHome::Lost;
                    Err(Error::DeviceLost("frame source"))
                }
            },
            SourceHome::InRun | SourceHome::Lost => {
                *home = SourceHome::Lost;
                Err(Error::DeviceLost("frame source"))
            }
        }
    }

    /// Stop a run grabber and put its source back.
    fn dock_grabber(&self, grabber: FrameGrabber<F>, cfg: &TestConfig) -> GrabStats {
        let (source, stats) = grabber.stop(cfg.join_timeout());
        *lock_unpoisoned(&self.source) = dock(source);
        stats
    }
}

fn dock<F>(source: Option<F>) -> SourceHome<F> {
    match source {
        Some(source) => SourceHome::Docked(source),
        None => {
            error!("frame grabber stuck; frame source unavailable");
            SourceHome::Lost
        }
    }
}

fn spawn_analyzer(
    analyzer: ContaminationAnalyzer,
    stop: &StopSignal,
) -> Result<Worker<AnalysisSummary>> {
    let stop = stop.clone();
    Worker::spawn("analyzer", move || analyzer.run(&stop)).map_err(|e| {
        error!("analyzer spawn failed: {e}");
        Error::Spawn("analyzer")
    })
}

fn grab_timing(cfg: &TestConfig) -> GrabTiming {
    GrabTiming {
        interval: cfg.grab_interval(),
        retry_backoff: cfg.grab_retry_backoff(),
    }
}

/// Copy the model into the record.  A fail-safe model has no baseline
/// statistics, only its threshold.
fn record_model(metrics: &SharedMetrics, model: &ThresholdModel) {
    let measured = (!model.fallback).then_some(model);
    metrics.update(|m| {
        m.baseline_samples = model.sample_count;
        m.baseline_mean = measured.map(|md| md.baseline_mean);
        m.baseline_quantile = measured.map(|md| md.baseline_quantile);
        m.baseline_std = measured.map(|md| md.baseline_std);
        m.guard_band = measured.map(|md| md.guard_band);
        m.effective_threshold = Some(model.effective_threshold);
        m.baseline_fallback = model.fallback;
    });
}
