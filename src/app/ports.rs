//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ TestService (domain)
//! ```
//!
//! Driven adapters (optical sensor, mist relay + rotor, result store, event
//! sinks, config files) implement these traits.  The
//! [`TestService`](super::service::TestService) consumes them via generics,
//! so the domain core never touches hardware directly.
//!
//! Device ports are moved into worker threads for the duration of a run, so
//! their implementations must be `Send`.

use crate::app::events::RunEvent;
use crate::app::metrics::{RunId, RunMetrics, RunStatus};
use crate::config::TestConfig;
use crate::error::{DeviceError, StoreError};
use crate::sensors::Frame;

// ───────────────────────────────────────────────────────────────
// Frame source port (driven adapter: optical sensor → domain)
// ───────────────────────────────────────────────────────────────

/// Camera, photodiode, or any other producer of brightness frames.
pub trait FrameSource {
    /// Acquire the device.  Called again after a failure, so it must be
    /// safe to call on an already-open source.
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Blocking single-frame read.
    fn read(&mut self) -> Result<Frame, DeviceError>;

    /// Release the device.  Must tolerate being called when not open.
    fn close(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → mist relay + rotor)
// ───────────────────────────────────────────────────────────────

/// Mist relay and rotational actuator.
pub trait ActuatorDriver {
    /// Prepare the rotational actuator.  A failure here degrades the run
    /// to mist-only; the relay must still be usable.
    fn init(&mut self) -> Result<(), DeviceError>;

    /// Energise (`true`) or release (`false`) the mist relay.
    fn set_relay(&mut self, on: bool) -> Result<(), DeviceError>;

    /// Blocking partial rotation (one segment, nominally 90°).
    fn rotate_segment(&mut self) -> Result<(), DeviceError>;

    /// De-energise everything.  Called once at the end of every actuation.
    fn cleanup(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Result store port (driven adapter: domain → persistence)
// ───────────────────────────────────────────────────────────────

/// Receives one frozen record per completed run.
pub trait RunStore {
    fn save_run(
        &mut self,
        run_id: &RunId,
        status: RunStatus,
        metrics: &RunMetrics,
    ) -> Result<(), StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / GUI)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`RunEvent`]s through this port.  Adapters
/// decide where they go (log, GUI status line, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &RunEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists test configuration.
///
/// Implementations MUST validate before persisting.  Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not silently clamped.
pub trait ConfigPort {
    /// Load configuration.  Returns [`TestConfig::default()`] if nothing
    /// has been stored yet.
    fn load(&self) -> Result<TestConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &TestConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config could not be parsed.
    Corrupted(String),
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    Io(String),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted(msg) => write!(f, "config corrupted: {}", msg),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::Io(msg) => write!(f, "config I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
