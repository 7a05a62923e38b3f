//! Hardware-side agent: one controller per entity area.
//!
//! Each controller owns its entities and injected HAL backends and runs as a
//! single-threaded cooperative task (see [`component::run`]): it publishes a
//! retained full-state snapshot on `{prefix}/{area}/state`, applies control
//! diffs from `{prefix}/{area}/ctrl`, and republishes whenever its own
//! periodic loop changes something (servo motion ticks, sensor readings).
//!
//! Controllers share no mutable state with each other; everything they agree
//! on travels over the bus.

pub mod component;
pub mod config;
pub mod distance;
pub mod led;
pub mod line;
pub mod motor;
pub mod servo;
pub mod telemetry;
pub mod vector;

pub use component::{Controller, run};
pub use config::AgentConfig;
pub use distance::DistanceSensorController;
pub use led::LedController;
pub use line::LineSensorController;
pub use motor::MotorController;
pub use servo::{ServoController, ServoMotion, ServoProfile};
pub use telemetry::init_logging;
pub use vector::VectorSensorController;
