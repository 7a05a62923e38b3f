//! Motor controller: speed diffs straight through to the drives.

use std::collections::HashMap;

use simplebot_hal::MotorDrive;
use simplebot_types::{Area, MotorCtrl, MotorState, RobotError};
use tracing::{debug, warn};

use crate::component::Controller;

/// Owns every named motor drive.  Motors have no periodic behavior; state
/// only changes when a ctrl diff arrives.
pub struct MotorController {
    motors: HashMap<String, MotorEntry>,
}

struct MotorEntry {
    drive: Box<dyn MotorDrive>,
    speed: f32,
}

impl MotorController {
    /// Wrap the injected drives; every motor starts stopped.
    pub fn new(drives: HashMap<String, Box<dyn MotorDrive>>) -> Result<Self, RobotError> {
        let mut motors = HashMap::new();
        for (name, mut drive) in drives {
            drive.set_throttle(0.0)?;
            motors.insert(name, MotorEntry { drive, speed: 0.0 });
        }
        Ok(Self { motors })
    }

    #[cfg(test)]
    fn speed(&self, name: &str) -> f32 {
        self.motors[name].speed
    }
}

impl Controller for MotorController {
    fn area(&self) -> Area {
        Area::Motors
    }

    fn apply_ctrl(&mut self, payload: &[u8]) -> Result<bool, RobotError> {
        let diffs: HashMap<String, MotorCtrl> =
            serde_json::from_slice(payload).map_err(|e| RobotError::MalformedMessage {
                topic: "motors/ctrl".to_string(),
                details: e.to_string(),
            })?;

        let mut updated = false;
        for (name, diff) in diffs {
            let Some(motor) = self.motors.get_mut(&name) else {
                debug!(motor = %name, "ctrl for unknown motor ignored");
                continue;
            };
            // Wire speed is percent; drives take [-1, 1].
            let speed = diff.speed().clamp(-100.0, 100.0);
            match motor.drive.set_throttle(speed / 100.0) {
                Ok(()) => {
                    motor.speed = speed;
                    updated = true;
                }
                Err(e) => warn!(motor = %name, error = %e, "motor drive rejected speed"),
            }
        }
        Ok(updated)
    }

    fn state_payload(&self) -> Result<Vec<u8>, RobotError> {
        let snapshot: HashMap<&str, MotorState> = self
            .motors
            .iter()
            .map(|(name, motor)| (name.as_str(), MotorState { speed: motor.speed }))
            .collect();
        serde_json::to_vec(&snapshot).map_err(|e| RobotError::Channel(e.to_string()))
    }
}
