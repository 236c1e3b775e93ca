//! Contamination analysis: threshold estimation, the analyzer worker, and
//! the heatmap projection.

pub mod analyzer;
pub mod heatmap;
pub mod threshold;
