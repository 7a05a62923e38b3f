//! Actuator capability traits.
//!
//! Each trait is the narrowest interface a controller needs: one PWM channel
//! per servo, one drive per motor, one pixel strip for the whole LED area.
//! Drivers are injected as `Box<dyn …>` at construction and owned exclusively
//! by their controller task.

use simplebot_types::{LedState, RobotError};

/// A single PWM output channel, e.g. one slot on a PCA9685 board.
pub trait PwmChannel: Send {
    /// Drive the channel to the given pulse width (driver units).
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::Hardware`] if the output cannot be applied.
    fn set_pulse(&mut self, pulse: u16) -> Result<(), RobotError>;
}

/// A signed motor driver.  Throttle is normalized to `[-1.0, 1.0]`.
pub trait MotorDrive: Send {
    /// Apply a throttle value; implementations clamp into `[-1.0, 1.0]`.
    fn set_throttle(&mut self, value: f32) -> Result<(), RobotError>;

    /// The most recently applied throttle.
    fn throttle(&self) -> f32;
}

/// An addressable LED strip with a global brightness.
///
/// Pixel writes are buffered; nothing reaches the LEDs until [`show`] is
/// called, matching how WS281x-style strips behave.
///
/// [`show`]: PixelStrip::show
pub trait PixelStrip: Send {
    /// Number of pixels on the strip.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer a color for the pixel at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::Hardware`] when `index` is out of range.
    fn set_pixel(&mut self, index: usize, color: LedState) -> Result<(), RobotError>;

    /// Current global brightness, 0–255.
    fn brightness(&self) -> u8;

    /// Set the global brightness, applied on the next [`show`].
    ///
    /// [`show`]: PixelStrip::show
    fn set_brightness(&mut self, brightness: u8) -> Result<(), RobotError>;

    /// Push all buffered pixel and brightness changes to the hardware.
    fn show(&mut self) -> Result<(), RobotError>;
}
