//! Run state machine: phase identity and the legal transition table.
//!
//! ```text
//!  IDLE ──[start]──▶ BASELINE ──[quantile ≥ bound]──▶ ABORTED_SEAL_WARNING
//!    ▲                   │                                    │
//!    │              [accepted]                              [ack]
//!    │                   ▼                                    │
//!    │               MISTING ──[actuation joined]──▶ ANALYZING│
//!    │                                                   │    │
//!    │                                      [window elapsed / stop]
//!    │                                                   ▼    │
//!    └──────────────[ack]────────────────────────── DECIDED   │
//!    ▲                                                        │
//!    └────────────────────────────────────────────────────────┘
//!
//!  BASELINE / MISTING / ANALYZING ──[cancelled or device lost]──▶ ERRORED ──[ack]──▶ IDLE
//! ```
//!
//! `ERRORED` closes a run that has no verdict; its record is persisted
//! with status `ERROR`.
//!
//! Exactly one [`RunState`] is active system-wide.  The current phase lives
//! in an atomic so the GUI boundary can poll it from any thread while the
//! run itself advances on the orchestration thread.

use core::sync::atomic::{AtomicU8, Ordering};

use log::{info, warn};
use serde::Serialize;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all run phases.
/// Must stay in sync with the table built in [`build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Baseline = 1,
    AbortedSealWarning = 2,
    Misting = 3,
    Analyzing = 4,
    Decided = 5,
    Errored = 6,
}

impl RunState {
    /// Total number of states; sizes the table array.
    pub const COUNT: usize = 7;

    /// Convert a `u8` index back to `RunState`.  Out-of-range values map
    /// to `Idle` after a debug assertion.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Baseline,
            2 => Self::AbortedSealWarning,
            3 => Self::Misting,
            4 => Self::Analyzing,
            5 => Self::Decided,
            6 => Self::Errored,
            _ => {
                debug_assert!(false, "invalid run state index: {idx}");
                Self::Idle
            }
        }
    }

    pub fn name(self) -> &'static str {
        STATE_TABLE[self as usize].name
    }

    /// States in which a run owns the devices.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Baseline | Self::Misting | Self::Analyzing)
    }
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Static descriptor for a single phase.
pub struct StateDescriptor {
    pub id: RunState,
    pub name: &'static str,
    /// Phases reachable from this one.
    pub next: &'static [RunState],
}

static STATE_TABLE: [StateDescriptor; RunState::COUNT] = build_state_table();

/// Build the static state table.
pub const fn build_state_table() -> [StateDescriptor; RunState::COUNT] {
    [
        // Index 0: Idle
        StateDescriptor {
            id: RunState::Idle,
            name: "Idle",
            next: &[RunState::Baseline],
        },
        // Index 1: Baseline
        StateDescriptor {
            id: RunState::Baseline,
            name: "Baseline",
            next: &[
                RunState::AbortedSealWarning,
                RunState::Misting,
                RunState::Errored,
            ],
        },
        // Index 2: AbortedSealWarning (terminal for the run)
        StateDescriptor {
            id: RunState::AbortedSealWarning,
            name: "AbortedSealWarning",
            next: &[RunState::Idle],
        },
        // Index 3: Misting
        StateDescriptor {
            id: RunState::Misting,
            name: "Misting",
            next: &[RunState::Analyzing, RunState::Errored],
        },
        // Index 4: Analyzing
        StateDescriptor {
            id: RunState::Analyzing,
            name: "Analyzing",
            next: &[RunState::Decided, RunState::Errored],
        },
        // Index 5: Decided
        StateDescriptor {
            id: RunState::Decided,
            name: "Decided",
            next: &[RunState::Idle],
        },
        // Index 6: Errored (terminal for the run, no verdict)
        StateDescriptor {
            id: RunState::Errored,
            name: "Errored",
            next: &[RunState::Idle],
        },
    ]
}

/// Whether `from -> to` appears in the transition table.
pub fn is_legal(from: RunState, to: RunState) -> bool {
    STATE_TABLE[from as usize].next.contains(&to)
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// Holder of the single system-wide run phase.
pub struct RunFsm {
    current: AtomicU8,
}

impl Default for RunFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl RunFsm {
    pub fn new() -> Self {
        Self {
            current: AtomicU8::new(RunState::Idle as u8),
        }
    }

    /// The current phase.
    pub fn current(&self) -> RunState {
        RunState::from_index(self.current.load(Ordering::Acquire) as usize)
    }

    /// Claim the run slot: `Idle -> Baseline` atomically.
    ///
    /// A second caller racing the first observes [`Error::Busy`]; runs are
    /// rejected, never interleaved.
    pub fn try_begin(&self) -> Result<()> {
        self.current
            .compare_exchange(
                RunState::Idle as u8,
                RunState::Baseline as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| info!("FSM transition: Idle -> Baseline"))
            .map_err(|_| Error::Busy)
    }

    /// Move to `to` if the table allows it from the current phase.
    pub fn transition(&self, to: RunState) -> Result<()> {
        let from = self.current();
        if !is_legal(from, to) {
            return Err(Error::InvalidTransition { from, to });
        }
        self.current
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|actual| Error::InvalidTransition {
                from: RunState::from_index(actual as usize),
                to,
            })?;
        info!("FSM transition: {} -> {}", from.name(), to.name());
        Ok(())
    }

    /// Drop back to `Idle` from anywhere.  Last resort when even the
    /// transition to `Errored` is refused.
    pub fn reset(&self) {
        let prev = RunState::from_index(
            self.current.swap(RunState::Idle as u8, Ordering::AcqRel) as usize,
        );
        if prev != RunState::Idle {
            warn!("FSM reset: {} -> Idle", prev.name());
        }
    }
}
