//! Unified error types for the tool-test engine.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! run state machine's error handling uniform.  Device and store errors are
//! their own small enums so workers can count and log them without
//! allocating a full [`Error`].

use core::fmt;

use crate::fsm::RunState;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the engine funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The sensor or actuator could not be opened, read, or written.
    Device(DeviceError),
    /// Zero usable baseline samples were collected.
    InsufficientBaselineData,
    /// The chamber baseline is above the ambient-light sanity bound.
    AmbientTooBright,
    /// The result store rejected a write.
    Persistence(StoreError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
    /// A run is already in progress.
    Busy,
    /// A phase transition outside the transition table was requested.
    InvalidTransition { from: RunState, to: RunState },
    /// A device handle was not returned by the worker that owned it.
    DeviceLost(&'static str),
    /// The OS refused to start a worker thread.
    Spawn(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(e) => write!(f, "device: {e}"),
            Self::InsufficientBaselineData => write!(f, "no usable baseline samples"),
            Self::AmbientTooBright => write!(f, "ambient light above sanity bound"),
            Self::Persistence(e) => write!(f, "persistence: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Busy => write!(f, "a test run is already active"),
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid transition {} -> {}", from.name(), to.name())
            }
            Self::DeviceLost(which) => write!(f, "{which} handle lost by a stuck worker"),
            Self::Spawn(which) => write!(f, "could not spawn {which} worker"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Device errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// Device could not be opened or is not attached.
    Unavailable,
    /// A read (frame grab, ADC conversion) failed or timed out.
    ReadFailed,
    /// A write (relay, coil, I2C command) failed.
    WriteFailed,
    /// The device was used before `open`/`init`.
    NotInitialised,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "device unavailable"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::NotInitialised => write!(f, "device not initialised"),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors from [`RunStore`](crate::app::ports::RunStore) and
/// [`ConfigPort`](crate::app::ports::ConfigPort) implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying file or database I/O failed.
    Io(String),
    /// The record could not be encoded or decoded.
    Encode(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Encode(msg) => write!(f, "encoding error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Persistence(e)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encode(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
