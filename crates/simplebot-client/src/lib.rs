//! Client library: a locally cached mirror of the robot's state.
//!
//! [`Robot::connect`] subscribes to every `{prefix}/+/state` topic, waits for
//! one snapshot from each entity area (the startup handshake), and from then
//! on keeps per-entity caches current from incoming snapshots.  Reads are
//! local and never touch the bus; writes accumulate in per-entity pending
//! buffers until an explicit per-area flush publishes one aggregate ctrl
//! diff.
//!
//! Sensor fusion lives here too: [`Compass`] observes a magnetometer entity
//! and derives a calibrated heading.

pub mod collection;
pub mod compass;
pub mod entity;
pub mod filter;
pub mod robot;

pub use collection::EntityCollection;
pub use compass::Compass;
pub use entity::{DistanceSensor, Led, LineSensor, Motor, Servo, VectorSensor};
pub use filter::MovingAverage;
pub use robot::Robot;
