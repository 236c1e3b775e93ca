//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements              | Connects to                  |
//! |-----------------|-------------------------|------------------------------|
//! | `ads7830`       | FrameSource             | I2C photodiode ADC           |
//! | `gpio_actuator` | ActuatorDriver          | Relay + stepper GPIO         |
//! | `json_store`    | RunStore, ConfigPort    | JSON-lines log, JSON file    |
//! | `log_sink`      | EventSink               | `log` facade                 |
//! | `sim`           | FrameSource             | Simulated chamber scene      |
//! |                 | ActuatorDriver          |                              |

pub mod ads7830;
pub mod gpio_actuator;
pub mod json_store;
pub mod log_sink;
pub mod sim;
