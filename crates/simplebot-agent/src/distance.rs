//! Distance sensor controller: poll the probes, publish on change.

use std::collections::HashMap;

use simplebot_hal::DistanceProbe;
use simplebot_types::{Area, DistanceState, RobotError};
use tracing::warn;

use crate::component::Controller;

pub struct DistanceSensorController {
    sensors: HashMap<String, DistanceEntry>,
}

struct DistanceEntry {
    probe: Box<dyn DistanceProbe>,
    // -1.0 marks "no reading yet"; the first poll always publishes.
    distance: f32,
}

impl DistanceSensorController {
    pub fn new(probes: HashMap<String, Box<dyn DistanceProbe>>) -> Self {
        let sensors = probes
            .into_iter()
            .map(|(name, probe)| (name, DistanceEntry { probe, distance: -1.0 }))
            .collect();
        Self { sensors }
    }
}

impl Controller for DistanceSensorController {
    fn area(&self) -> Area {
        Area::DistanceSensors
    }

    fn poll(&mut self) -> Result<bool, RobotError> {
        let mut changed = false;
        for (name, sensor) in &mut self.sensors {
            match sensor.probe.read_distance() {
                Ok(distance) if distance != sensor.distance => {
                    sensor.distance = distance;
                    changed = true;
                }
                Ok(_) => {}
                Err(e) => warn!(sensor = %name, error = %e, "distance read failed"),
            }
        }
        Ok(changed)
    }

    fn state_payload(&self) -> Result<Vec<u8>, RobotError> {
        let snapshot: HashMap<&str, DistanceState> = self
            .sensors
            .iter()
            .map(|(name, sensor)| (name.as_str(), DistanceState { distance: sensor.distance }))
            .collect();
        serde_json::to_vec(&snapshot).map_err(|e| RobotError::Channel(e.to_string()))
    }
}
