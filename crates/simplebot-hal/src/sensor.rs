//! Sensor capability traits.

use simplebot_types::{AxesState, RobotError};

/// An ultrasonic (or similar) range finder.
pub trait DistanceProbe: Send {
    /// Latest distance in metres.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::Hardware`] if the reading fails.
    fn read_distance(&mut self) -> Result<f32, RobotError>;
}

/// A reflectance line detector.
pub trait LineProbe: Send {
    /// True while a line is detected under the sensor.
    fn line_detected(&mut self) -> Result<bool, RobotError>;
}

/// A 3-axis sensor (magnetometer, accelerometer).
pub trait VectorProbe: Send {
    /// Latest (x, y, z) reading in the sensor's native units.
    fn read(&mut self) -> Result<AxesState, RobotError>;
}
