//! Application core: run orchestration and the port boundary.
//!
//! This module contains the business rules for a contamination test:
//! baseline, actuation, analysis, verdict, and persistence.  All
//! interaction with hardware happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;
