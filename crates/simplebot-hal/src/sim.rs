//! In-process simulated backends for headless tests and CI.
//!
//! Every sim type is a cheap `Clone` around shared interior state: hand one
//! clone to the controller as its boxed backend and keep another in the test
//! to inspect recorded commands or drive sensor readings.

use std::sync::{Arc, Mutex};

use simplebot_types::{AxesState, LedState, RobotError};

use crate::actuator::{MotorDrive, PixelStrip, PwmChannel};
use crate::sensor::{DistanceProbe, LineProbe, VectorProbe};

// ─────────────────────────────────────────────────────────────────────────────
// Actuators
// ─────────────────────────────────────────────────────────────────────────────

/// Simulated PWM channel recording every pulse written to it.
#[derive(Debug, Clone, Default)]
pub struct SimPwm {
    pulses: Arc<Mutex<Vec<u16>>>,
}

impl SimPwm {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent pulse written, if any.
    pub fn last_pulse(&self) -> Option<u16> {
        self.pulses.lock().expect("sim lock").last().copied()
    }

    /// Every pulse written, oldest first.
    pub fn history(&self) -> Vec<u16> {
        self.pulses.lock().expect("sim lock").clone()
    }
}

impl PwmChannel for SimPwm {
    fn set_pulse(&mut self, pulse: u16) -> Result<(), RobotError> {
        self.pulses.lock().expect("sim lock").push(pulse);
        Ok(())
    }
}

/// Simulated motor drive recording the current throttle.
#[derive(Debug, Clone, Default)]
pub struct SimMotor {
    throttle: Arc<Mutex<f32>>,
}

impl SimMotor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MotorDrive for SimMotor {
    fn set_throttle(&mut self, value: f32) -> Result<(), RobotError> {
        *self.throttle.lock().expect("sim lock") = value.clamp(-1.0, 1.0);
        Ok(())
    }

    fn throttle(&self) -> f32 {
        *self.throttle.lock().expect("sim lock")
    }
}

#[derive(Debug, Default)]
struct SimStripInner {
    pixels: Vec<LedState>,
    brightness: u8,
    show_count: usize,
}

/// Simulated pixel strip recording buffered colors, brightness, and how many
/// times `show` was called.
#[derive(Debug, Clone)]
pub struct SimPixelStrip {
    inner: Arc<Mutex<SimStripInner>>,
}

impl SimPixelStrip {
    pub fn new(len: usize, brightness: u8) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimStripInner {
                pixels: vec![LedState::default(); len],
                brightness,
                show_count: 0,
            })),
        }
    }

    pub fn pixel(&self, index: usize) -> Option<LedState> {
        self.inner.lock().expect("sim lock").pixels.get(index).copied()
    }

    /// Number of completed `show` calls.
    pub fn show_count(&self) -> usize {
        self.inner.lock().expect("sim lock").show_count
    }
}

impl PixelStrip for SimPixelStrip {
    fn len(&self) -> usize {
        self.inner.lock().expect("sim lock").pixels.len()
    }

    fn set_pixel(&mut self, index: usize, color: LedState) -> Result<(), RobotError> {
        let mut inner = self.inner.lock().expect("sim lock");
        match inner.pixels.get_mut(index) {
            Some(pixel) => {
                *pixel = color;
                Ok(())
            }
            None => Err(RobotError::Hardware {
                component: "sim_pixel_strip".to_string(),
                details: format!("pixel index {index} out of range"),
            }),
        }
    }

    fn brightness(&self) -> u8 {
        self.inner.lock().expect("sim lock").brightness
    }

    fn set_brightness(&mut self, brightness: u8) -> Result<(), RobotError> {
        self.inner.lock().expect("sim lock").brightness = brightness;
        Ok(())
    }

    fn show(&mut self) -> Result<(), RobotError> {
        self.inner.lock().expect("sim lock").show_count += 1;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sensors
// ─────────────────────────────────────────────────────────────────────────────

/// Simulated distance probe with a test-settable reading.
#[derive(Debug, Clone)]
pub struct SimDistanceProbe {
    distance: Arc<Mutex<f32>>,
}

impl SimDistanceProbe {
    pub fn new(distance: f32) -> Self {
        Self {
            distance: Arc::new(Mutex::new(distance)),
        }
    }

    pub fn set_distance(&self, distance: f32) {
        *self.distance.lock().expect("sim lock") = distance;
    }
}

impl DistanceProbe for SimDistanceProbe {
    fn read_distance(&mut self) -> Result<f32, RobotError> {
        Ok(*self.distance.lock().expect("sim lock"))
    }
}

/// Simulated line probe with a test-settable reading.
#[derive(Debug, Clone, Default)]
pub struct SimLineProbe {
    detected: Arc<Mutex<bool>>,
}

impl SimLineProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_detected(&self, detected: bool) {
        *self.detected.lock().expect("sim lock") = detected;
    }
}

impl LineProbe for SimLineProbe {
    fn line_detected(&mut self) -> Result<bool, RobotError> {
        Ok(*self.detected.lock().expect("sim lock"))
    }
}

/// Simulated 3-axis probe with a test-settable reading.
#[derive(Debug, Clone, Default)]
pub struct SimVectorProbe {
    reading: Arc<Mutex<AxesState>>,
}

impl SimVectorProbe {
    pub fn new(reading: AxesState) -> Self {
        Self {
            reading: Arc::new(Mutex::new(reading)),
        }
    }

    pub fn set_reading(&self, reading: AxesState) {
        *self.reading.lock().expect("sim lock") = reading;
    }
}

impl VectorProbe for SimVectorProbe {
    fn read(&mut self) -> Result<AxesState, RobotError> {
        Ok(*self.reading.lock().expect("sim lock"))
    }
}
