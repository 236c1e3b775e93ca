//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured run events to the `log`
//! facade (stderr via `env_logger` in the binary).  A GUI status-line
//! adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::RunEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`RunEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &RunEvent) {
        match event {
            RunEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from.name(), to.name());
            }
            RunEvent::BaselineReady(m) => {
                info!(
                    "BASELINE | q={:.3} std={:.3} guard={:.3} thr={:.3} n={}{}",
                    m.baseline_quantile,
                    m.baseline_std,
                    m.guard_band,
                    m.effective_threshold,
                    m.sample_count,
                    if m.fallback { " fail-safe" } else { "" },
                );
            }
            RunEvent::Verdict {
                run_id,
                status,
                max_brightness,
                effective_threshold,
                heatmap,
            } => {
                info!(
                    "VERDICT | run={} status={} max={:.3} thr={} heatmap={}",
                    run_id,
                    status,
                    max_brightness,
                    effective_threshold.map_or_else(|| "-".to_string(), |t| format!("{t:.3}")),
                    heatmap
                        .as_ref()
                        .map_or_else(|| "-".to_string(), |p| p.display().to_string()),
                );
            }
            RunEvent::PersistFailed { run_id, reason } => {
                warn!("PERSIST | run={} failed: {}", run_id, reason);
            }
        }
    }
}
