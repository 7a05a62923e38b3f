//! Compass heading derived from a magnetometer entity.
//!
//! Raw magnetometer axes are useless until calibrated: the robot is spun in
//! place between [`calibration_start`] and [`calibration_finish`] while the
//! compass records each axis's extrema.  Readings are then normalized
//! against those extrema and smoothed with a moving average before the
//! heading is computed.
//!
//! [`calibration_start`]: Compass::calibration_start
//! [`calibration_finish`]: Compass::calibration_finish

use std::sync::{Arc, Mutex, PoisonError};

use simplebot_types::AxesState;

use crate::entity::VectorSensor;
use crate::filter::MovingAverage;

/// Running min/max of one axis.
///
/// Starts inverted (min above max) so the first sample initializes both
/// bounds; until then the range is degenerate and [`normalize`] returns 0.
///
/// [`normalize`]: AxisRange::normalize
#[derive(Debug, Clone, Copy)]
pub struct AxisRange {
    min: f32,
    max: f32,
}

impl AxisRange {
    pub fn new() -> Self {
        Self { min: 1000.0, max: -1000.0 }
    }

    pub fn extend(&mut self, value: f32) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    /// Clamp into the calibrated range and rescale to `[-100, 100]`.
    /// A degenerate range (max ≤ min) maps everything to 0.
    pub fn normalize(&self, value: f32) -> f32 {
        if self.max <= self.min {
            return 0.0;
        }
        let clamped = value.clamp(self.min, self.max);
        (clamped - self.min) / (self.max - self.min) * 200.0 - 100.0
    }
}

impl Default for AxisRange {
    fn default() -> Self {
        Self::new()
    }
}

struct CompassInner {
    calibrating: bool,
    calibrated: bool,
    x: AxisRange,
    y: AxisRange,
    z: AxisRange,
    avg_x: MovingAverage,
    avg_y: MovingAverage,
    avg_z: MovingAverage,
}

/// Fused heading over one magnetometer.  Cheap to clone; all clones share
/// the same calibration and filter state.
#[derive(Clone)]
pub struct Compass {
    inner: Arc<Mutex<CompassInner>>,
}

impl Compass {
    pub const DEFAULT_WINDOW: usize = 10;

    pub fn new() -> Self {
        Self::with_window(Self::DEFAULT_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CompassInner {
                calibrating: false,
                calibrated: false,
                x: AxisRange::new(),
                y: AxisRange::new(),
                z: AxisRange::new(),
                avg_x: MovingAverage::new(window),
                avg_y: MovingAverage::new(window),
                avg_z: MovingAverage::new(window),
            })),
        }
    }

    /// Register this compass as an observer on a magnetometer entity; every
    /// snapshot replace feeds it from then on.
    pub fn attach(&self, sensor: &VectorSensor) {
        let inner = Arc::clone(&self.inner);
        sensor.observe(move |reading| Self::update(&inner, reading));
    }

    /// Feed one reading directly (what [`attach`](Compass::attach) wires up).
    pub fn ingest(&self, reading: &AxesState) {
        Self::update(&self.inner, reading);
    }

    fn update(inner: &Arc<Mutex<CompassInner>>, reading: &AxesState) {
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.calibrating {
            inner.x.extend(reading.x);
            inner.y.extend(reading.y);
            inner.z.extend(reading.z);
        }
        inner.avg_x.push(reading.x);
        inner.avg_y.push(reading.y);
        inner.avg_z.push(reading.z);
    }

    /// Reset the extrema and begin extending them with incoming readings.
    pub fn calibration_start(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.x = AxisRange::new();
        inner.y = AxisRange::new();
        inner.z = AxisRange::new();
        inner.calibrating = true;
        inner.calibrated = true;
    }

    /// Stop extending the extrema; the retained ranges drive normalization.
    pub fn calibration_finish(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calibrating = false;
    }

    pub fn is_calibrating(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calibrating
    }

    /// The smoothed reading, normalized per axis against the calibrated
    /// extrema.
    pub fn normalized(&self) -> AxesState {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        AxesState {
            x: inner.x.normalize(inner.avg_x.average()),
            y: inner.y.normalize(inner.avg_y.average()),
            z: inner.z.normalize(inner.avg_z.average()),
        }
    }

    /// Heading in degrees, `[0, 360)`.  `None` until a calibration has been
    /// started at least once.
    pub fn bearing(&self) -> Option<f32> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.calibrated {
            return None;
        }
        let nx = inner.x.normalize(inner.avg_x.average());
        let ny = inner.y.normalize(inner.avg_y.average());
        Some((nx.atan2(ny).to_degrees() + 180.0).rem_euclid(360.0))
    }
}

impl Default for Compass {
    fn default() -> Self {
        Self::new()
    }
}
