//! End-to-end verdict scenarios against the mock chamber.
//!
//! Each test drives one full run through `TestService::start_test` and
//! checks the verdict, the metrics record handed to the store, and the
//! events emitted on the way.

use tooltest::app::events::RunEvent;
use tooltest::app::metrics::RunStatus;
use tooltest::fsm::RunState;

use crate::mock_hw::{ActuatorCall, Scene, count, fast_config, rig};

fn states(events: &crate::mock_hw::EventLog) -> Vec<(RunState, RunState)> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            RunEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

fn verdicts(events: &crate::mock_hw::EventLog) -> Vec<RunStatus> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            RunEvent::Verdict { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

// ── Contaminated tool ─────────────────────────────────────────

#[test]
fn glow_above_guard_band_fails_the_tool() {
    let r = rig(Scene::new(0.3, 0.5), fast_config());
    let outcome = r.service.start_test().unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.persisted);
    let m = &outcome.metrics;
    let thr = m.effective_threshold.unwrap();
    assert!((thr - 0.4).abs() < 1e-3, "threshold {thr}");
    assert!((m.baseline_quantile.unwrap() - 0.3).abs() < 1e-3);
    assert!(!m.baseline_fallback);
    assert!((m.max_brightness - 0.5).abs() < 1e-3);
    assert!(m.first_exceed_time.is_some());
    assert!(m.frames_analysis > 0);
    assert!(m.frames_baseline > 0);
    assert_eq!(m.status, Some(RunStatus::Failed));
    assert!(m.total_time().unwrap() > 0.0);
    assert!(m.analysis_time().unwrap() > 0.0);
    assert_eq!(r.service.state(), RunState::Decided);
}

#[test]
fn full_run_walks_every_phase_in_order() {
    let r = rig(Scene::new(0.3, 0.5), fast_config());
    r.service.start_test().unwrap();

    assert_eq!(
        states(&r.events),
        vec![
            (RunState::Idle, RunState::Baseline),
            (RunState::Baseline, RunState::Misting),
            (RunState::Misting, RunState::Analyzing),
            (RunState::Analyzing, RunState::Decided),
        ]
    );
    assert_eq!(verdicts(&r.events), vec![RunStatus::Failed]);
    assert!(
        r.events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, RunEvent::BaselineReady(m) if !m.fallback))
    );
}

// ── Clean tool ────────────────────────────────────────────────

#[test]
fn glow_inside_guard_band_passes_the_tool() {
    let r = rig(Scene::new(0.3, 0.35), fast_config());
    let outcome = r.service.start_test().unwrap();

    assert_eq!(outcome.status, RunStatus::Passed);
    assert!(outcome.metrics.first_exceed_time.is_none());
    assert!(outcome.metrics.max_brightness < outcome.metrics.effective_threshold.unwrap());

    let saved = r.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, outcome.run_id);
    assert_eq!(saved[0].1, RunStatus::Passed);
}

#[test]
fn concurrent_run_mists_once_and_rotates_every_segment() {
    let r = rig(Scene::new(0.3, 0.35), fast_config());
    let outcome = r.service.start_test().unwrap();

    assert_eq!(count(&r.calls, ActuatorCall::Relay(true)), 1);
    assert_eq!(count(&r.calls, ActuatorCall::Relay(false)), 1);
    assert_eq!(count(&r.calls, ActuatorCall::Rotate), 4);
    assert_eq!(count(&r.calls, ActuatorCall::Cleanup), 1);
    assert!(!r.scene.relay_energised());
    assert!(outcome.metrics.mist_time >= 0.04);
    assert!(!outcome.metrics.actuator_degraded);
}

// ── Light leak ────────────────────────────────────────────────

#[test]
fn bright_baseline_aborts_before_misting() {
    let r = rig(Scene::new(1.2, 5.0), fast_config());
    let outcome = r.service.start_test().unwrap();

    assert_eq!(outcome.status, RunStatus::AbortedSealWarning);
    assert!(outcome.persisted);
    assert_eq!(r.service.state(), RunState::AbortedSealWarning);

    // Nothing was sprayed or turned, and nothing was analysed.
    assert!(r.calls.lock().unwrap().is_empty());
    assert!(!r.scene.reagent_applied());
    assert_eq!(outcome.metrics.frames_analysis, 0);
    assert!(outcome.metrics.analysis_start.is_none());

    assert_eq!(
        states(&r.events),
        vec![
            (RunState::Idle, RunState::Baseline),
            (RunState::Baseline, RunState::AbortedSealWarning),
        ]
    );
    assert_eq!(verdicts(&r.events), vec![RunStatus::AbortedSealWarning]);
    assert_eq!(r.saved.lock().unwrap()[0].1, RunStatus::AbortedSealWarning);
}

#[test]
fn disabled_ambient_gate_lets_bright_baseline_through() {
    let cfg = tooltest::config::TestConfig {
        ambient_abort_bound: None,
        ..fast_config()
    };
    let r = rig(Scene::new(1.2, 1.25), cfg);
    let outcome = r.service.start_test().unwrap();
    assert_eq!(outcome.status, RunStatus::Passed);
    assert_eq!(count(&r.calls, ActuatorCall::Relay(true)), 1);
}

// ── Dead camera ───────────────────────────────────────────────

#[test]
fn dead_camera_falls_back_to_fail_safe_threshold() {
    let r = rig(Scene::dead_camera(0.5), fast_config());
    let outcome = r.service.start_test().unwrap();

    let m = &outcome.metrics;
    assert!(m.baseline_fallback);
    assert_eq!(m.effective_threshold, Some(255.0));
    // No baseline statistics exist; only the threshold is recorded.
    assert_eq!(m.baseline_quantile, None);
    assert_eq!(m.baseline_mean, None);
    assert_eq!(m.baseline_std, None);
    assert_eq!(m.guard_band, None);
    assert_eq!(m.baseline_samples, 0);
    let saved = r.saved.lock().unwrap();
    assert_eq!(saved[0].2.baseline_quantile, None);
    assert_eq!(saved[0].2.effective_threshold, Some(255.0));
    drop(saved);
    assert!(m.read_errors > 0);
    assert!(m.baseline_misses > 0);
    assert_eq!(m.frames_baseline, 0);
    assert_eq!(m.frames_analysis, 0);

    // The fail-safe model must not masquerade as a light leak.
    assert_eq!(outcome.status, RunStatus::Passed);
    assert_eq!(count(&r.calls, ActuatorCall::Relay(true)), 1);
    assert!(
        r.events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, RunEvent::BaselineReady(m) if m.fallback))
    );
}
