//! LED controller: named pixels on one strip, plus a strip-wide brightness.
//!
//! The ctrl payload for this area is mixed: per-LED color objects keyed by
//! name, and an optional scalar `"brightness"` key at the same level.  The
//! state snapshot keeps the two apart ([`LedAreaState`]).

use std::collections::HashMap;

use serde_json::Value;
use simplebot_hal::PixelStrip;
use simplebot_types::{Area, LedAreaState, LedCtrl, LedState, RobotError};
use tracing::{debug, warn};

use crate::component::Controller;

pub struct LedController {
    strip: Box<dyn PixelStrip>,
    /// Name to pixel-index map, fixed at construction.
    layout: HashMap<String, usize>,
    colors: HashMap<String, LedState>,
}

impl LedController {
    /// Map `layout` names onto strip indices and blank the strip.
    pub fn new(
        mut strip: Box<dyn PixelStrip>,
        layout: HashMap<String, usize>,
    ) -> Result<Self, RobotError> {
        let mut colors = HashMap::new();
        for (name, &index) in &layout {
            strip.set_pixel(index, LedState::default())?;
            colors.insert(name.clone(), LedState::default());
        }
        strip.show()?;
        Ok(Self { strip, layout, colors })
    }
}

impl Controller for LedController {
    fn area(&self) -> Area {
        Area::Leds
    }

    fn apply_ctrl(&mut self, payload: &[u8]) -> Result<bool, RobotError> {
        let diff: HashMap<String, Value> =
            serde_json::from_slice(payload).map_err(|e| RobotError::MalformedMessage {
                topic: "leds/ctrl".to_string(),
                details: e.to_string(),
            })?;

        let mut updated = false;
        for (key, value) in diff {
            if key == "brightness" {
                let Some(brightness) = value.as_u64().filter(|&b| b <= 255) else {
                    warn!(value = %value, "brightness out of range; entry dropped");
                    continue;
                };
                self.strip.set_brightness(brightness as u8)?;
                updated = true;
                continue;
            }
            let Some(&index) = self.layout.get(&key) else {
                debug!(led = %key, "ctrl for unknown led ignored");
                continue;
            };
            let color: LedCtrl = match serde_json::from_value(value) {
                Ok(color) => color,
                Err(e) => {
                    warn!(led = %key, error = %e, "bad led color; entry dropped");
                    continue;
                }
            };
            let color = LedState { red: color.red, green: color.green, blue: color.blue };
            self.strip.set_pixel(index, color)?;
            self.colors.insert(key, color);
            updated = true;
        }

        if updated {
            self.strip.show()?;
        }
        Ok(updated)
    }

    fn state_payload(&self) -> Result<Vec<u8>, RobotError> {
        let snapshot = LedAreaState {
            brightness: self.strip.brightness(),
            leds: self.colors.clone(),
        };
        serde_json::to_vec(&snapshot).map_err(|e| RobotError::Channel(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplebot_hal::SimPixelStrip;

    fn controller() -> (LedController, SimPixelStrip) {
        let sim = SimPixelStrip::new(3, 255);
        let layout = HashMap::from([
            ("front".to_string(), 0),
            ("back".to_string(), 2),
        ]);
        (LedController::new(Box::new(sim.clone()), layout).unwrap(), sim)
    }

    #[test]
    fn construction_blanks_mapped_pixels() {
        let (_ctrl, sim) = controller();
        assert_eq!(sim.pixel(0), Some(LedState::default()));
        assert_eq!(sim.show_count(), 1);
    }

    #[test]
    fn color_diff_reaches_the_strip() {
        let (mut ctrl, sim) = controller();
        let updated = ctrl
            .apply_ctrl(br#"{"front": {"red": 255, "green": 10, "blue": 0}}"#)
            .unwrap();
        assert!(updated);
        assert_eq!(sim.pixel(0), Some(LedState { red: 255, green: 10, blue: 0 }));
        assert_eq!(sim.show_count(), 2);
    }

    #[test]
    fn mixed_payload_sets_brightness_and_color() {
        let (mut ctrl, sim) = controller();
        let updated = ctrl
            .apply_ctrl(br#"{"brightness": 64, "back": {"red": 0, "green": 0, "blue": 9}}"#)
            .unwrap();
        assert!(updated);
        assert_eq!(sim.brightness(), 64);
        assert_eq!(sim.pixel(2), Some(LedState { red: 0, green: 0, blue: 9 }));
    }

    #[test]
    fn bad_entries_dropped_without_failing_the_rest() {
        let (mut ctrl, sim) = controller();
        let updated = ctrl
            .apply_ctrl(
                br#"{"brightness": 900, "ghost": {"red": 1, "green": 1, "blue": 1}, "front": {"red": 5, "green": 5, "blue": 5}}"#,
            )
            .unwrap();
        assert!(updated);
        assert_eq!(sim.pixel(0), Some(LedState { red: 5, green: 5, blue: 5 }));
    }

    #[test]
    fn state_payload_carries_brightness_and_led_map() {
        let (mut ctrl, _sim) = controller();
        ctrl.apply_ctrl(br#"{"brightness": 32}"#).unwrap();
        let snapshot: LedAreaState =
            serde_json::from_slice(&ctrl.state_payload().unwrap()).unwrap();
        assert_eq!(snapshot.brightness, 32);
        assert_eq!(snapshot.leds.len(), 2);
        assert_eq!(snapshot.leds["front"], LedState::default());
    }
}
