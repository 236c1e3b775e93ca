//! Simulated chamber: a camera and an actuator that share one scene.
//!
//! Energising the mist relay applies reagent to the scene.  If the chamber
//! was built with a contaminated tool, every later frame carries a glowing
//! spot; otherwise frames stay at the ambient level.  Used by the binary
//! for bench runs and by tests that want the whole pipeline end to end.

use core::time::Duration;
use std::sync::{Arc, Mutex};
use std::thread;

use image::Luma;
use log::debug;

use crate::app::ports::{ActuatorDriver, FrameSource};
use crate::control::worker::lock_unpoisoned;
use crate::error::DeviceError;
use crate::sensors::{BrightnessGrid, Frame};

/// Static description of the simulated scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ChamberSpec {
    pub width: u32,
    pub height: u32,
    /// Dark-chamber brightness.
    pub ambient: f32,
    /// Peak-to-peak deterministic sensor noise around `ambient`.
    pub noise: f32,
    /// Extra brightness of the contamination spot once reagent is applied;
    /// 0 for a clean tool.
    pub glow: f32,
    /// Radius of the contamination spot in pixels.
    pub glow_radius: u32,
    /// Time one `read` takes.
    pub frame_time: Duration,
}

impl Default for ChamberSpec {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            ambient: 0.2,
            noise: 0.1,
            glow: 0.0,
            glow_radius: 6,
            frame_time: Duration::from_millis(10),
        }
    }
}

#[derive(Debug)]
struct ChamberState {
    spec: ChamberSpec,
    reagent_applied: bool,
    relay_on: bool,
    camera_failing: bool,
    frames: u64,
    relay_cycles: u32,
    segments: u32,
}

/// Shared scene handle.  Clones see the same chamber.
#[derive(Debug, Clone)]
pub struct SimChamber {
    state: Arc<Mutex<ChamberState>>,
}

impl SimChamber {
    pub fn new(spec: ChamberSpec) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChamberState {
                spec,
                reagent_applied: false,
                relay_on: false,
                camera_failing: false,
                frames: 0,
                relay_cycles: 0,
                segments: 0,
            })),
        }
    }

    pub fn camera(&self) -> SimCamera {
        SimCamera {
            chamber: self.clone(),
            open: false,
        }
    }

    /// Actuator bound to this chamber.  With `rotor_attached == false`
    /// the rotor fails to initialise.
    pub fn actuator(&self, rotor_attached: bool, segment_time: Duration) -> SimActuator {
        SimActuator {
            chamber: self.clone(),
            rotor_attached,
            segment_time,
        }
    }

    /// Make every subsequent open and read fail.
    pub fn set_camera_failing(&self, failing: bool) {
        lock_unpoisoned(&self.state).camera_failing = failing;
    }

    /// Wipe the reagent, ready for another tool.
    pub fn reset(&self) {
        lock_unpoisoned(&self.state).reagent_applied = false;
    }

    pub fn reagent_applied(&self) -> bool {
        lock_unpoisoned(&self.state).reagent_applied
    }

    pub fn relay_on(&self) -> bool {
        lock_unpoisoned(&self.state).relay_on
    }

    pub fn relay_cycles(&self) -> u32 {
        lock_unpoisoned(&self.state).relay_cycles
    }

    pub fn segments_rotated(&self) -> u32 {
        lock_unpoisoned(&self.state).segments
    }

    fn render(&self) -> Result<(Frame, Duration), DeviceError> {
        let mut st = lock_unpoisoned(&self.state);
        if st.camera_failing {
            return Err(DeviceError::ReadFailed);
        }
        st.frames += 1;
        let spec = &st.spec;
        // Deterministic ripple in [-noise/2, +noise/2].
        let phase = (st.frames % 8) as f32 / 7.0 - 0.5;
        let base = (spec.ambient + spec.noise * phase).max(0.0);
        let glowing = st.reagent_applied && spec.glow > 0.0;
        let (cx, cy) = (spec.width / 2, spec.height / 2);
        let r2 = u64::from(spec.glow_radius) * u64::from(spec.glow_radius);
        let glow = spec.glow;
        let grid = BrightnessGrid::from_fn(spec.width, spec.height, |x, y| {
            let dx = u64::from(x.abs_diff(cx));
            let dy = u64::from(y.abs_diff(cy));
            let lit = glowing && dx * dx + dy * dy <= r2;
            Luma([if lit { (base + glow).min(255.0) } else { base }])
        });
        Ok((Frame::from_brightness(grid), spec.frame_time))
    }
}

// ───────────────────────────────────────────────────────────────
// Camera
// ───────────────────────────────────────────────────────────────

pub struct SimCamera {
    chamber: SimChamber,
    open: bool,
}

impl FrameSource for SimCamera {
    fn open(&mut self) -> Result<(), DeviceError> {
        if lock_unpoisoned(&self.chamber.state).camera_failing {
            return Err(DeviceError::Unavailable);
        }
        self.open = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, DeviceError> {
        if !self.open {
            return Err(DeviceError::NotInitialised);
        }
        let (frame, frame_time) = self.chamber.render()?;
        thread::sleep(frame_time);
        Ok(frame)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

// ───────────────────────────────────────────────────────────────
// Actuator
// ───────────────────────────────────────────────────────────────

pub struct SimActuator {
    chamber: SimChamber,
    rotor_attached: bool,
    segment_time: Duration,
}

impl ActuatorDriver for SimActuator {
    fn init(&mut self) -> Result<(), DeviceError> {
        if self.rotor_attached {
            Ok(())
        } else {
            Err(DeviceError::Unavailable)
        }
    }

    fn set_relay(&mut self, on: bool) -> Result<(), DeviceError> {
        let mut st = lock_unpoisoned(&self.chamber.state);
        if on && !st.relay_on {
            st.relay_cycles += 1;
            st.reagent_applied = true;
        }
        st.relay_on = on;
        debug!("sim relay {}", if on { "ON" } else { "OFF" });
        Ok(())
    }

    fn rotate_segment(&mut self) -> Result<(), DeviceError> {
        if !self.rotor_attached {
            return Err(DeviceError::NotInitialised);
        }
        thread::sleep(self.segment_time);
        lock_unpoisoned(&self.chamber.state).segments += 1;
        Ok(())
    }

    fn cleanup(&mut self) {
        lock_unpoisoned(&self.chamber.state).relay_on = false;
    }
}
