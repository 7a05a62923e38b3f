//! Line sensor controller.
//!
//! Unlike the distance sensors, a line reading is binary so there is no
//! sentinel for "unread"; the constructor takes the first reading itself and
//! the startup snapshot is already real.

use std::collections::HashMap;

use simplebot_hal::LineProbe;
use simplebot_types::{Area, LineState, RobotError};
use tracing::warn;

use crate::component::Controller;

pub struct LineSensorController {
    sensors: HashMap<String, LineEntry>,
}

struct LineEntry {
    probe: Box<dyn LineProbe>,
    line: bool,
}

impl LineSensorController {
    pub fn new(probes: HashMap<String, Box<dyn LineProbe>>) -> Result<Self, RobotError> {
        let mut sensors = HashMap::new();
        for (name, mut probe) in probes {
            let line = probe.line_detected()?;
            sensors.insert(name, LineEntry { probe, line });
        }
        Ok(Self { sensors })
    }
}

impl Controller for LineSensorController {
    fn area(&self) -> Area {
        Area::LineSensors
    }

    fn poll(&mut self) -> Result<bool, RobotError> {
        let mut changed = false;
        for (name, sensor) in &mut self.sensors {
            match sensor.probe.line_detected() {
                Ok(line) if line != sensor.line => {
                    sensor.line = line;
                    changed = true;
                }
                Ok(_) => {}
                Err(e) => warn!(sensor = %name, error = %e, "line read failed"),
            }
        }
        Ok(changed)
    }

    fn state_payload(&self) -> Result<Vec<u8>, RobotError> {
        let snapshot: HashMap<&str, LineState> = self
            .sensors
            .iter()
            .map(|(name, sensor)| (name.as_str(), LineState { line: sensor.line }))
            .collect();
        serde_json::to_vec(&snapshot).map_err(|e| RobotError::Channel(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplebot_hal::SimLineProbe;

    fn controller(initial: bool) -> (LineSensorController, SimLineProbe) {
        let sim = SimLineProbe::new();
        sim.set_detected(initial);
        let mut probes: HashMap<String, Box<dyn LineProbe>> = HashMap::new();
        probes.insert("center".to_string(), Box::new(sim.clone()));
        (LineSensorController::new(probes).unwrap(), sim)
    }

    #[test]
    fn constructor_takes_initial_reading() {
        let (ctrl, _sim) = controller(true);
        let snapshot: HashMap<String, LineState> =
            serde_json::from_slice(&ctrl.state_payload().unwrap()).unwrap();
        assert!(snapshot["center"].line);
    }

    #[test]
    fn poll_reports_only_transitions() {
        let (mut ctrl, sim) = controller(false);
        assert!(!ctrl.poll().unwrap());
        sim.set_detected(true);
        assert!(ctrl.poll().unwrap());
        assert!(!ctrl.poll().unwrap());
    }
}
