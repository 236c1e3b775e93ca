//! `TestService` lifecycle: commands, cancellation, persistence failures,
//! degraded hardware, and the preview grabber.

use std::thread;
use std::time::{Duration, Instant};

use tooltest::app::commands::RunCommand;
use tooltest::app::events::RunEvent;
use tooltest::app::metrics::RunStatus;
use tooltest::app::service::TestService;
use tooltest::config::{ActuationStrategy, TestConfig};
use tooltest::error::Error;
use tooltest::fsm::RunState;

use crate::mock_hw::{
    ActuatorCall, MockActuator, MockCamera, MockStore, RecordingSink, Scene, count, fast_config,
    rig, rig_with, wait_for_state,
};

/// Fast config whose analysis window is long enough to catch mid-flight.
fn long_analysis() -> TestConfig {
    TestConfig {
        analysis_min_duration_ms: 5_000,
        ..fast_config()
    }
}

// ── Busy / stop ───────────────────────────────────────────────

#[test]
fn second_start_while_running_is_busy() {
    let r = rig(Scene::new(0.3, 0.5), long_analysis());
    thread::scope(|s| {
        let run = s.spawn(|| r.service.start_test());
        assert!(wait_for_state(&r.service, RunState::Analyzing));

        assert!(matches!(r.service.start_test(), Err(Error::Busy)));
        assert!(matches!(
            r.service.handle_command(RunCommand::StartTest),
            Err(Error::Busy)
        ));

        thread::sleep(Duration::from_millis(20));
        r.service.stop();
        let outcome = run.join().unwrap().unwrap();
        assert_eq!(outcome.status, RunStatus::Failed);
    });
    // Only the first run reached the store.
    assert_eq!(r.saved.lock().unwrap().len(), 1);
}

#[test]
fn stop_during_analysis_decides_early_and_is_idempotent() {
    let r = rig(Scene::new(0.3, 0.5), long_analysis());
    let started = Instant::now();
    thread::scope(|s| {
        let run = s.spawn(|| r.service.start_test());
        assert!(wait_for_state(&r.service, RunState::Analyzing));
        thread::sleep(Duration::from_millis(20));

        r.service.stop();
        r.service.stop();
        r.service.handle_command(RunCommand::Stop).unwrap();

        let outcome = run.join().unwrap().unwrap();
        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.metrics.frames_analysis > 0);
    });
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(count(&r.calls, ActuatorCall::Relay(true)), 1);
    assert_eq!(count(&r.calls, ActuatorCall::Relay(false)), 1);
    assert_eq!(r.service.state(), RunState::Decided);
}

#[test]
fn stop_during_misting_still_releases_relay() {
    let cfg = TestConfig {
        mist_duration_ms: 5_000,
        ..fast_config()
    };
    let r = rig(Scene::new(0.3, 0.5), cfg);
    thread::scope(|s| {
        let run = s.spawn(|| r.service.start_test());
        assert!(wait_for_state(&r.service, RunState::Misting));
        thread::sleep(Duration::from_millis(20));
        r.service.stop();
        let outcome = run.join().unwrap().unwrap();
        assert!(outcome.metrics.mist_time < 5.0);
    });
    assert!(!r.scene.relay_energised());
    assert_eq!(count(&r.calls, ActuatorCall::Cleanup), 1);
}

#[test]
fn stop_during_baseline_errors_without_misting() {
    let cfg = TestConfig {
        baseline_duration_ms: 3_000,
        ..fast_config()
    };
    let r = rig(Scene::new(0.3, 0.5), cfg);
    let started = Instant::now();
    thread::scope(|s| {
        let run = s.spawn(|| r.service.start_test());
        assert!(wait_for_state(&r.service, RunState::Baseline));
        thread::sleep(Duration::from_millis(5));
        r.service.stop();

        let outcome = run.join().unwrap().unwrap();
        assert_eq!(outcome.status, RunStatus::Error);
        assert!(outcome.persisted);
        assert_eq!(outcome.metrics.frames_analysis, 0);
        assert_eq!(outcome.metrics.status, Some(RunStatus::Error));
    });
    assert!(started.elapsed() < Duration::from_secs(2));

    // The relay never fired and the tool was never sprayed.
    assert!(r.calls.lock().unwrap().is_empty());
    assert!(!r.scene.reagent_applied());
    assert_eq!(r.service.state(), RunState::Errored);

    let saved = r.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].1, RunStatus::Error);
    drop(saved);

    // An errored run is acknowledged like any other.
    r.service.acknowledge().unwrap();
    assert_eq!(r.service.state(), RunState::Idle);
}

#[test]
fn stop_before_analysis_sees_a_frame_is_an_error() {
    let cfg = TestConfig {
        mist_duration_ms: 5_000,
        ..fast_config()
    };
    let r = rig(Scene::new(0.3, 0.5), cfg);
    thread::scope(|s| {
        let run = s.spawn(|| r.service.start_test());
        assert!(wait_for_state(&r.service, RunState::Misting));
        r.service.stop();
        let outcome = run.join().unwrap().unwrap();
        assert_eq!(outcome.status, RunStatus::Error);
        assert_eq!(outcome.metrics.frames_analysis, 0);
    });
    assert_eq!(r.service.state(), RunState::Errored);
    assert_eq!(r.saved.lock().unwrap()[0].1, RunStatus::Error);

    // The next start acknowledges the errored run implicitly.
    let again = r.service.start_test().unwrap();
    assert_ne!(again.status, RunStatus::Error);
    assert_eq!(r.service.state(), RunState::Decided);
}

#[test]
fn stop_while_idle_is_a_no_op() {
    let r = rig(Scene::new(0.3, 0.5), fast_config());
    r.service.stop();
    assert_eq!(r.service.state(), RunState::Idle);
    assert!(r.service.start_test().is_ok());
}

// ── Acknowledge ───────────────────────────────────────────────

#[test]
fn acknowledge_returns_to_idle_exactly_once() {
    let r = rig(Scene::new(0.3, 0.35), fast_config());
    r.service.start_test().unwrap();
    assert_eq!(r.service.state(), RunState::Decided);

    r.service.acknowledge().unwrap();
    assert_eq!(r.service.state(), RunState::Idle);
    assert!(matches!(
        r.service.acknowledge(),
        Err(Error::InvalidTransition {
            from: RunState::Idle,
            to: RunState::Idle
        })
    ));
}

#[test]
fn start_after_unacknowledged_verdict_runs_again() {
    let r = rig(Scene::new(0.3, 0.35), fast_config());
    let first = r.service.start_test().unwrap();
    let second = r.service.start_test().unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(r.saved.lock().unwrap().len(), 2);
    assert_eq!(r.service.last_outcome().unwrap().run_id, second.run_id);
}

// ── Degraded hardware ─────────────────────────────────────────

#[test]
fn missing_rotor_degrades_to_mist_only() {
    let scene = Scene::new(0.3, 0.5);
    let (actuator, calls) = MockActuator::without_rotor(&scene);
    let r = rig_with(scene, fast_config(), actuator, calls);
    let outcome = r.service.start_test().unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    let m = &outcome.metrics;
    assert!(m.actuator_degraded);
    assert_eq!(m.rotation_time_accum, 0.0);
    assert!(m.mist_time > 0.0);
    assert_eq!(count(&r.calls, ActuatorCall::Rotate), 0);
    assert_eq!(count(&r.calls, ActuatorCall::Relay(true)), 1);
    assert_eq!(count(&r.calls, ActuatorCall::Relay(false)), 1);
}

#[test]
fn lost_actuator_is_recorded_as_an_error() {
    let scene = Scene::new(0.3, 0.5);
    let (actuator, calls) = MockActuator::stuck_rotor(&scene, Duration::from_secs(3));
    let cfg = TestConfig {
        rotor_segment_timeout_ms: 20,
        join_timeout_ms: 100,
        ..fast_config()
    };
    let r = rig_with(scene, cfg, actuator, calls);

    // The first run outlives its stuck actuator worker and still decides.
    let first = r.service.start_test().unwrap();
    assert_eq!(first.status, RunStatus::Failed);

    let second = r.service.start_test();
    assert!(matches!(second, Err(Error::DeviceLost("actuator"))));
    assert_eq!(r.service.state(), RunState::Errored);

    let saved = r.saved.lock().unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[1].1, RunStatus::Error);
    assert_eq!(saved[1].2.status, Some(RunStatus::Error));
    assert!(saved[1].2.total_time().is_some());
    let error_id = saved[1].0.clone();
    drop(saved);

    assert_eq!(r.service.last_outcome().unwrap().run_id, error_id);
    assert!(r.events.lock().unwrap().iter().any(|e| matches!(
        e,
        RunEvent::Verdict { run_id, status: RunStatus::Error, .. } if *run_id == error_id
    )));
}

#[test]
fn sequential_strategy_mists_then_rotates() {
    let cfg = TestConfig {
        strategy: ActuationStrategy::Sequential,
        ..fast_config()
    };
    let r = rig(Scene::new(0.3, 0.5), cfg);
    r.service.start_test().unwrap();
    assert_eq!(
        *r.calls.lock().unwrap(),
        vec![
            ActuatorCall::Init,
            ActuatorCall::Relay(true),
            ActuatorCall::Relay(false),
            ActuatorCall::Rotate,
            ActuatorCall::Rotate,
            ActuatorCall::Cleanup,
        ]
    );
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn store_failure_keeps_the_verdict() {
    let scene = Scene::new(0.3, 0.5);
    let (actuator, _calls) = MockActuator::new(&scene);
    let (sink, events) = RecordingSink::new();
    let service = TestService::new(
        fast_config(),
        MockCamera::new(&scene),
        actuator,
        MockStore::failing(),
        sink,
    )
    .unwrap();

    let outcome = service.start_test().unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(!outcome.persisted);

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::PersistFailed { run_id, reason }
            if *run_id == outcome.run_id && reason.contains("disk full")
    )));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, RunEvent::Verdict { status: RunStatus::Failed, .. }))
    );
}

#[test]
fn heatmap_written_when_directory_configured() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TestConfig {
        heatmap_dir: Some(dir.path().to_path_buf()),
        ..fast_config()
    };
    let r = rig(Scene::new(0.3, 0.5), cfg);
    let outcome = r.service.start_test().unwrap();

    let path = outcome.heatmap.expect("heatmap path");
    assert!(path.starts_with(dir.path()));
    assert!(path.exists());
    assert_eq!(outcome.metrics.pct_above_threshold, Some(100.0));
}

// ── Configuration ─────────────────────────────────────────────

#[test]
fn invalid_config_rejected_at_construction() {
    let scene = Scene::new(0.3, 0.5);
    let (actuator, _) = MockActuator::new(&scene);
    let (store, _) = MockStore::new();
    let (sink, _) = RecordingSink::new();
    let cfg = TestConfig {
        baseline_quantile: 50.0,
        ..fast_config()
    };
    let built = TestService::new(cfg, MockCamera::new(&scene), actuator, store, sink);
    assert!(matches!(built, Err(Error::Config(_))));
}

#[test]
fn update_config_validates_and_applies() {
    let r = rig(Scene::new(0.3, 0.5), fast_config());
    let bad = TestConfig {
        segments_per_revolution: 0,
        ..fast_config()
    };
    assert!(matches!(r.service.update_config(bad), Err(Error::Config(_))));

    let good = TestConfig {
        rotations: 3,
        ..fast_config()
    };
    r.service
        .handle_command(RunCommand::UpdateConfig(good))
        .unwrap();
    assert_eq!(r.service.config().rotations, 3);
}

#[test]
fn update_config_refused_mid_run() {
    let r = rig(Scene::new(0.3, 0.5), long_analysis());
    thread::scope(|s| {
        let run = s.spawn(|| r.service.start_test());
        assert!(wait_for_state(&r.service, RunState::Analyzing));
        assert!(matches!(
            r.service.update_config(fast_config()),
            Err(Error::Busy)
        ));
        r.service.stop();
        run.join().unwrap().unwrap();
    });
    assert_eq!(r.service.config().analysis_min_duration_ms, 5_000);
}

// ── Preview ───────────────────────────────────────────────────

#[test]
fn preview_streams_frames_and_yields_to_a_run() {
    let r = rig(Scene::new(0.3, 0.35), fast_config());
    r.service.start_preview().unwrap();
    // A second start is harmless.
    r.service.handle_command(RunCommand::StartPreview).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while r.service.latest_frame().is_none() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    let frame = r.service.latest_frame().expect("preview frame");
    assert_eq!(frame.dimensions(), (4, 4));

    let outcome = r.service.start_test().unwrap();
    assert_eq!(outcome.status, RunStatus::Passed);

    // The source is docked again after the run.
    r.service.stop_preview();
    r.service.start_preview().unwrap();
    r.service.stop_preview();
}
