//! Outbound run events.
//!
//! The [`TestService`](super::service::TestService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them: log them, drive a status line, etc.

use std::path::PathBuf;

use crate::analysis::threshold::ThresholdModel;
use crate::app::metrics::{RunId, RunStatus};
use crate::fsm::RunState;

/// Structured events emitted by the test engine.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The run moved between phases.
    StateChanged { from: RunState, to: RunState },

    /// The baseline window closed and a threshold model is in force.
    BaselineReady(ThresholdModel),

    /// A run ended: a verdict, the seal-warning abort, or `ERROR`.
    /// `effective_threshold` is `None` when the run never got a baseline.
    Verdict {
        run_id: RunId,
        status: RunStatus,
        max_brightness: f32,
        effective_threshold: Option<f32>,
        heatmap: Option<PathBuf>,
    },

    /// The result store rejected the run record.
    PersistFailed { run_id: RunId, reason: String },
}
