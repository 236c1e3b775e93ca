//! ToolTest engine library.
//!
//! Detects chemiluminescent contamination on surgical tools sealed in a
//! dark chamber: a baseline of the dark chamber sets an adaptive
//! threshold, the tool is misted with reagent while it rotates, and any
//! frame brighter than the threshold fails the run.
//!
//! Exposes every module for integration testing; the binary in `main.rs`
//! wires the simulated chamber adapters for a bench run.

#![deny(unused_must_use)]

pub mod adapters;
pub mod analysis;
pub mod app;
pub mod config;
pub mod control;
pub mod error;
pub mod fsm;
pub mod sensors;
