//! Mock hardware adapters for integration tests.
//!
//! The camera and actuator share a [`Scene`]: energising the relay switches
//! the scene to its "misted" brightness, the way reagent lights up a
//! contaminated tool.  Every actuator call, stored run, and emitted event is
//! recorded behind an `Arc` so tests can inspect them after the service has
//! taken ownership of the adapter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tooltest::app::events::RunEvent;
use tooltest::app::metrics::{RunId, RunMetrics, RunStatus};
use tooltest::app::ports::{ActuatorDriver, EventSink, FrameSource, RunStore};
use tooltest::app::service::TestService;
use tooltest::config::{ActuationStrategy, AnalysisSchedule, TestConfig};
use tooltest::error::{DeviceError, StoreError};
use tooltest::fsm::RunState;
use tooltest::sensors::Frame;

// ── Scene ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct SceneState {
    dark: f32,
    misted: f32,
    relay_energised: bool,
    reagent_applied: bool,
    camera_dead: bool,
}

#[derive(Clone)]
pub struct Scene {
    state: Arc<Mutex<SceneState>>,
}

#[allow(dead_code)]
impl Scene {
    /// Uniform `dark` brightness until the relay fires, `misted` after.
    pub fn new(dark: f32, misted: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SceneState {
                dark,
                misted,
                relay_energised: false,
                reagent_applied: false,
                camera_dead: false,
            })),
        }
    }

    /// A scene whose camera never opens or reads.
    pub fn dead_camera(misted: f32) -> Self {
        let scene = Self::new(0.0, misted);
        scene.state.lock().unwrap().camera_dead = true;
        scene
    }

    pub fn relay_energised(&self) -> bool {
        self.state.lock().unwrap().relay_energised
    }

    pub fn reagent_applied(&self) -> bool {
        self.state.lock().unwrap().reagent_applied
    }

    fn level(&self) -> Result<f32, DeviceError> {
        let st = self.state.lock().unwrap();
        if st.camera_dead {
            return Err(DeviceError::Unavailable);
        }
        Ok(if st.reagent_applied { st.misted } else { st.dark })
    }
}

// ── Camera ────────────────────────────────────────────────────

pub struct MockCamera {
    scene: Scene,
    pub opens: Arc<Mutex<u32>>,
}

#[allow(dead_code)]
impl MockCamera {
    pub fn new(scene: &Scene) -> Self {
        Self {
            scene: scene.clone(),
            opens: Arc::default(),
        }
    }
}

impl FrameSource for MockCamera {
    fn open(&mut self) -> Result<(), DeviceError> {
        self.scene.level()?;
        *self.opens.lock().unwrap() += 1;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, DeviceError> {
        let level = self.scene.level().map_err(|_| DeviceError::ReadFailed)?;
        std::thread::sleep(std::time::Duration::from_millis(1));
        Ok(Frame::uniform(4, 4, level))
    }

    fn close(&mut self) {}
}

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    Init,
    Relay(bool),
    Rotate,
    Cleanup,
}

pub type CallLog = Arc<Mutex<Vec<ActuatorCall>>>;

// ── MockActuator ──────────────────────────────────────────────

pub struct MockActuator {
    scene: Scene,
    calls: CallLog,
    fail_init: bool,
    rotor_hang: Option<Duration>,
}

#[allow(dead_code)]
impl MockActuator {
    pub fn new(scene: &Scene) -> (Self, CallLog) {
        let calls = CallLog::default();
        (
            Self {
                scene: scene.clone(),
                calls: Arc::clone(&calls),
                fail_init: false,
                rotor_hang: None,
            },
            calls,
        )
    }

    /// Actuator whose rotor never initialises.
    pub fn without_rotor(scene: &Scene) -> (Self, CallLog) {
        let (mut act, calls) = Self::new(scene);
        act.fail_init = true;
        (act, calls)
    }

    /// Actuator whose rotor blocks for `hang` on every segment.
    pub fn stuck_rotor(scene: &Scene, hang: Duration) -> (Self, CallLog) {
        let (mut act, calls) = Self::new(scene);
        act.rotor_hang = Some(hang);
        (act, calls)
    }
}

impl ActuatorDriver for MockActuator {
    fn init(&mut self) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push(ActuatorCall::Init);
        if self.fail_init {
            Err(DeviceError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn set_relay(&mut self, on: bool) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push(ActuatorCall::Relay(on));
        let mut st = self.scene.state.lock().unwrap();
        st.relay_energised = on;
        if on {
            st.reagent_applied = true;
        }
        Ok(())
    }

    fn rotate_segment(&mut self) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push(ActuatorCall::Rotate);
        if let Some(hang) = self.rotor_hang {
            std::thread::sleep(hang);
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.calls.lock().unwrap().push(ActuatorCall::Cleanup);
    }
}

#[allow(dead_code)]
pub fn count(calls: &CallLog, call: ActuatorCall) -> usize {
    calls.lock().unwrap().iter().filter(|c| **c == call).count()
}

// ── Result store ──────────────────────────────────────────────

pub type SavedRuns = Arc<Mutex<Vec<(RunId, RunStatus, RunMetrics)>>>;

pub struct MockStore {
    saved: SavedRuns,
    fail: bool,
}

#[allow(dead_code)]
impl MockStore {
    pub fn new() -> (Self, SavedRuns) {
        let saved = SavedRuns::default();
        (
            Self {
                saved: Arc::clone(&saved),
                fail: false,
            },
            saved,
        )
    }

    /// A store that rejects every write.
    pub fn failing() -> Self {
        Self {
            saved: SavedRuns::default(),
            fail: true,
        }
    }
}

impl RunStore for MockStore {
    fn save_run(
        &mut self,
        run_id: &RunId,
        status: RunStatus,
        metrics: &RunMetrics,
    ) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Io("disk full".into()));
        }
        self.saved
            .lock()
            .unwrap()
            .push((run_id.clone(), status, metrics.clone()));
        Ok(())
    }
}

// ── Event sink ────────────────────────────────────────────────

pub type EventLog = Arc<Mutex<Vec<RunEvent>>>;

/// Records every emitted event.
pub struct RecordingSink {
    events: EventLog,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> (Self, EventLog) {
        let events = EventLog::default();
        (
            Self {
                events: Arc::clone(&events),
            },
            events,
        )
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &RunEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Fixtures ──────────────────────────────────────────────────

/// Millisecond-scale timings so a full run finishes in well under a second.
/// Threshold knobs: p95, 0.1 floor, 3σ, so a 0.3 baseline gives 0.4.
#[allow(dead_code)]
pub fn fast_config() -> TestConfig {
    TestConfig {
        baseline_duration_ms: 50,
        baseline_sample_period_ms: 5,
        min_baseline_samples: 5,
        baseline_quantile: 95.0,
        guard_abs_floor: 0.1,
        guard_sigma_multiplier: 3.0,
        ambient_abort_bound: Some(1.0),
        strategy: ActuationStrategy::Concurrent,
        analysis_schedule: AnalysisSchedule::AfterActuation,
        mist_duration_ms: 40,
        revolutions: 1.0,
        segments_per_revolution: 4,
        rotations: 2,
        rotation_delay_ms: 20,
        analysis_min_duration_ms: 40,
        analysis_poll_ms: 5,
        grab_interval_ms: 1,
        grab_retry_backoff_ms: 1,
        join_timeout_ms: 500,
        rotor_segment_timeout_ms: 200,
        ..TestConfig::default()
    }
}

pub type MockService = TestService<MockCamera, MockActuator, MockStore, RecordingSink>;

/// A service wired to mocks, plus handles onto everything they record.
pub struct Rig {
    pub service: MockService,
    pub scene: Scene,
    pub calls: CallLog,
    pub saved: SavedRuns,
    pub events: EventLog,
}

#[allow(dead_code)]
pub fn rig(scene: Scene, config: TestConfig) -> Rig {
    let (actuator, calls) = MockActuator::new(&scene);
    rig_with(scene, config, actuator, calls)
}

#[allow(dead_code)]
pub fn rig_with(scene: Scene, config: TestConfig, actuator: MockActuator, calls: CallLog) -> Rig {
    let (store, saved) = MockStore::new();
    let (sink, events) = RecordingSink::new();
    let service = TestService::new(config, MockCamera::new(&scene), actuator, store, sink)
        .expect("valid test config");
    Rig {
        service,
        scene,
        calls,
        saved,
        events,
    }
}

/// Poll until `service` reaches `state` or five seconds pass.
#[allow(dead_code)]
pub fn wait_for_state(service: &MockService, state: RunState) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if service.state() == state {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    false
}
