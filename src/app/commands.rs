//! Inbound commands to the test service.
//!
//! These represent actions requested by the outside world (GUI buttons,
//! CLI, remote operator) that the
//! [`TestService`](super::service::TestService) interprets and acts upon.

use crate::config::TestConfig;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone)]
pub enum RunCommand {
    /// Run a full test on the calling thread; blocks until a verdict.
    StartTest,

    /// Cancel the active run.  No-op when idle.
    Stop,

    /// Clear a finished run's verdict and return to idle.
    Acknowledge,

    /// Start or stop the live preview grabber while idle.
    StartPreview,
    StopPreview,

    /// Replace the configuration used by the next run.
    UpdateConfig(TestConfig),
}
