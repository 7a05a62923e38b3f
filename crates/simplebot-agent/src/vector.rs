//! 3-axis sensor controller, shared by magnetometers and accelerometers.
//!
//! The two areas carry the same payload shape; only the area tag differs, so
//! one controller type serves both via its named constructors.

use std::collections::HashMap;

use simplebot_hal::VectorProbe;
use simplebot_types::{Area, AxesState, RobotError};
use tracing::warn;

use crate::component::Controller;

pub struct VectorSensorController {
    area: Area,
    sensors: HashMap<String, VectorEntry>,
}

struct VectorEntry {
    probe: Box<dyn VectorProbe>,
    reading: AxesState,
}

impl VectorSensorController {
    pub fn magnetometers(
        probes: HashMap<String, Box<dyn VectorProbe>>,
    ) -> Result<Self, RobotError> {
        Self::new(Area::Magnetometers, probes)
    }

    pub fn accelerometers(
        probes: HashMap<String, Box<dyn VectorProbe>>,
    ) -> Result<Self, RobotError> {
        Self::new(Area::Accelerometers, probes)
    }

    fn new(
        area: Area,
        probes: HashMap<String, Box<dyn VectorProbe>>,
    ) -> Result<Self, RobotError> {
        let mut sensors = HashMap::new();
        for (name, mut probe) in probes {
            let reading = probe.read()?;
            sensors.insert(name, VectorEntry { probe, reading });
        }
        Ok(Self { area, sensors })
    }
}

impl Controller for VectorSensorController {
    fn area(&self) -> Area {
        self.area
    }

    fn poll(&mut self) -> Result<bool, RobotError> {
        let mut changed = false;
        for (name, sensor) in &mut self.sensors {
            match sensor.probe.read() {
                Ok(reading) if reading != sensor.reading => {
                    sensor.reading = reading;
                    changed = true;
                }
                Ok(_) => {}
                Err(e) => warn!(sensor = %name, error = %e, "axis read failed"),
            }
        }
        Ok(changed)
    }

    fn state_payload(&self) -> Result<Vec<u8>, RobotError> {
        let snapshot: HashMap<&str, AxesState> = self
            .sensors
            .iter()
            .map(|(name, sensor)| (name.as_str(), sensor.reading))
            .collect();
        serde_json::to_vec(&snapshot).map_err(|e| RobotError::Channel(e.to_string()))
    }
}
