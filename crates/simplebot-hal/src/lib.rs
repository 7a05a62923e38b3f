//! Hardware abstraction layer for the simplebot agent.
//!
//! Controllers never touch GPIO, PWM, or I2C directly; they are handed boxed
//! capability traits at construction.  Real drivers implement these traits on
//! the robot; the `sim` module provides in-process implementations so the
//! full stack runs in headless tests and CI without hardware.  Backend
//! selection is an explicit construction-time decision, never import-time
//! feature detection.

pub mod actuator;
pub mod sensor;
pub mod sim;

pub use actuator::{MotorDrive, PixelStrip, PwmChannel};
pub use sensor::{DistanceProbe, LineProbe, VectorProbe};
pub use sim::{
    SimDistanceProbe, SimLineProbe, SimMotor, SimPixelStrip, SimPwm, SimVectorProbe,
};
