//! GPIO actuator: mist relay plus a four-coil unipolar stepper.
//!
//! Written against `embedded-hal` 1.0 traits so any HAL that provides
//! `OutputPin` and `DelayNs` (linux-embedded-hal, rppal, …) can drive it.
//!
//! Default wiring (BCM numbering): relay on 17, coils on 23/24/25/8.
//! One segment is a quarter turn: 128 steps, each step walking the
//! four-phase wave sequence with a 2 ms dwell per phase.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::app::ports::ActuatorDriver;
use crate::error::DeviceError;

pub const RELAY_PIN: u8 = 17;
pub const COIL_PINS: [u8; 4] = [23, 24, 25, 8];

/// Steps per 90° segment.
pub const STEPS_PER_SEGMENT: u32 = 128;
/// Dwell per wave phase, microseconds.
pub const PHASE_DWELL_US: u32 = 2_000;

/// One coil energised at a time.
pub const WAVE_SEQUENCE: [[bool; 4]; 4] = [
    [true, false, false, false],
    [false, true, false, false],
    [false, false, true, false],
    [false, false, false, true],
];

/// The four stepper coils and the delay used between phases.
pub struct Stepper<P, D> {
    coils: [P; 4],
    delay: D,
    steps_per_segment: u32,
    dwell_us: u32,
}

impl<P: OutputPin, D: DelayNs> Stepper<P, D> {
    pub fn new(coils: [P; 4], delay: D) -> Self {
        Self {
            coils,
            delay,
            steps_per_segment: STEPS_PER_SEGMENT,
            dwell_us: PHASE_DWELL_US,
        }
    }

    /// Override the segment length and dwell (e.g. for a geared rotor).
    pub fn with_timing(mut self, steps_per_segment: u32, dwell_us: u32) -> Self {
        self.steps_per_segment = steps_per_segment;
        self.dwell_us = dwell_us;
        self
    }

    fn apply(&mut self, phase: &[bool; 4]) -> Result<(), DeviceError> {
        for (coil, &on) in self.coils.iter_mut().zip(phase) {
            let res = if on { coil.set_high() } else { coil.set_low() };
            res.map_err(|_| DeviceError::WriteFailed)?;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        self.apply(&[false; 4])
    }

    fn segment(&mut self) -> Result<(), DeviceError> {
        for _ in 0..self.steps_per_segment {
            for phase in &WAVE_SEQUENCE {
                self.apply(phase)?;
                self.delay.delay_us(self.dwell_us);
            }
        }
        self.release()
    }
}

/// Relay pin `R` and an optional stepper.  Without a stepper, `init`
/// reports the rotor unavailable and the run degrades to mist-only.
pub struct GpioActuator<R, P, D> {
    relay: R,
    stepper: Option<Stepper<P, D>>,
    ready: bool,
}

impl<R: OutputPin, P: OutputPin, D: DelayNs> GpioActuator<R, P, D> {
    pub fn new(relay: R, stepper: Option<Stepper<P, D>>) -> Self {
        Self {
            relay,
            stepper,
            ready: false,
        }
    }
}

impl<R: OutputPin, P: OutputPin, D: DelayNs> ActuatorDriver for GpioActuator<R, P, D> {
    fn init(&mut self) -> Result<(), DeviceError> {
        let stepper = self.stepper.as_mut().ok_or(DeviceError::Unavailable)?;
        stepper.release()?;
        self.ready = true;
        info!("stepper ready");
        Ok(())
    }

    fn set_relay(&mut self, on: bool) -> Result<(), DeviceError> {
        let res = if on {
            self.relay.set_high()
        } else {
            self.relay.set_low()
        };
        res.map_err(|_| DeviceError::WriteFailed)
    }

    fn rotate_segment(&mut self) -> Result<(), DeviceError> {
        if !self.ready {
            return Err(DeviceError::NotInitialised);
        }
        self.stepper
            .as_mut()
            .ok_or(DeviceError::Unavailable)?
            .segment()
    }

    fn cleanup(&mut self) {
        if self.relay.set_low().is_err() {
            warn!("relay release failed during cleanup");
        }
        if let Some(stepper) = self.stepper.as_mut() {
            if stepper.release().is_err() {
                warn!("coil release failed during cleanup");
            }
        }
        self.ready = false;
    }
}
