//! Worker supervision and actuator choreography.

pub mod actuation;
pub mod worker;
