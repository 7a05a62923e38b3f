//! Servo motion: tick-based angle interpolation.
//!
//! Servos do not jump to a commanded angle; [`ServoMotion`] interpolates
//! toward the target at a commanded rate, one controller tick at a time
//! (reference cadence 37 ms ≈ 27 Hz).  Speed is expressed in degrees settled
//! per tick-group: `ticks_per_degree = 1 / speed`, and a tick that crosses
//! the accumulated threshold may move several degrees at once (catch-up for
//! speeds above one degree per tick).

use std::collections::HashMap;
use std::time::Duration;

use simplebot_hal::PwmChannel;
use simplebot_types::{Area, RobotError, ServoCtrl, ServoMotionState, ServoState};
use tracing::{debug, warn};

use crate::component::Controller;

/// Motion tick period of the servo controller.
pub const SERVO_TICK: Duration = Duration::from_millis(37);

/// Fixed output-mapping constants for one servo, set at construction.
#[derive(Debug, Clone, Copy)]
pub struct ServoProfile {
    pub pwm_min: u16,
    pub pwm_max: u16,
    /// Pulse driven on construction and reset.
    pub pwm_init: u16,
    /// Full mechanical sweep in degrees (e.g. 180).
    pub angle_range: i32,
    pub angle_min: i32,
    pub angle_max: i32,
}

/// Per-servo interpolation state machine.
///
/// States: `Idle` (angle == target, output steady) and `Moving` (stepping
/// toward target each tick).  The angle never overshoots the target.
pub struct ServoMotion {
    profile: ServoProfile,
    output: Box<dyn PwmChannel>,
    angle: i32,
    target_angle: i32,
    speed: f32,
    state: ServoMotionState,
    ticks_per_degree: f64,
    tick_count: u32,
}

impl ServoMotion {
    /// Build the state machine and drive the output to its initial pulse.
    pub fn new(profile: ServoProfile, output: Box<dyn PwmChannel>) -> Result<Self, RobotError> {
        let mut servo = Self {
            profile,
            output,
            angle: 0,
            target_angle: 0,
            speed: 0.0,
            state: ServoMotionState::Idle,
            ticks_per_degree: 0.0,
            tick_count: 0,
        };
        servo.reset()?;
        Ok(servo)
    }

    /// Return to the initial position: idle at angle 0, output at `pwm_init`.
    pub fn reset(&mut self) -> Result<(), RobotError> {
        self.angle = 0;
        self.target_angle = 0;
        self.state = ServoMotionState::Idle;
        self.tick_count = 0;
        self.output.set_pulse(self.profile.pwm_init)
    }

    /// Command a move to `target` degrees at `speed` degrees per tick-group.
    ///
    /// The target is clamped into `[angle_min, angle_max]`.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::InvalidSpeed`] for `speed <= 0`, before any
    /// division happens.
    pub fn set_angle(&mut self, target: i32, speed: f32) -> Result<(), RobotError> {
        if speed <= 0.0 {
            return Err(RobotError::InvalidSpeed(speed));
        }
        self.target_angle = target.clamp(self.profile.angle_min, self.profile.angle_max);
        self.speed = speed;
        self.ticks_per_degree = 1.0 / f64::from(speed);
        self.state = if self.target_angle != self.angle {
            ServoMotionState::Moving
        } else {
            ServoMotionState::Idle
        };
        Ok(())
    }

    /// Advance one tick.  Returns whether the angle changed.
    pub fn tick(&mut self) -> Result<bool, RobotError> {
        if self.state == ServoMotionState::Idle {
            return Ok(false);
        }
        self.tick_count += 1;
        if f64::from(self.tick_count) < self.ticks_per_degree {
            return Ok(false);
        }

        // Crossing the threshold may be worth several degrees at once.
        let degrees = (f64::from(self.tick_count) / self.ticks_per_degree).floor() as i32;
        self.tick_count = 0;

        let remaining = self.target_angle - self.angle;
        let step = degrees.min(remaining.abs()) * remaining.signum();
        self.angle += step;
        self.drive_output()?;

        if self.angle == self.target_angle {
            self.state = ServoMotionState::Idle;
        }
        Ok(step != 0)
    }

    // Linear map from angle to pulse width.  The half-range shift centres
    // angle 0 on the middle of the sweep.
    fn drive_output(&mut self) -> Result<(), RobotError> {
        let span = f64::from(self.profile.pwm_max) - f64::from(self.profile.pwm_min);
        let range = f64::from(self.profile.angle_range);
        let pulse = f64::from(self.profile.pwm_min)
            + span / range * (f64::from(self.angle) + range / 2.0);
        self.output.set_pulse(pulse.round().clamp(0.0, f64::from(u16::MAX)) as u16)
    }

    pub fn angle(&self) -> i32 {
        self.angle
    }

    pub fn target_angle(&self) -> i32 {
        self.target_angle
    }

    pub fn state(&self) -> ServoMotionState {
        self.state
    }

    /// Snapshot for the wire.
    pub fn snapshot(&self) -> ServoState {
        ServoState {
            angle: self.angle,
            target_angle: self.target_angle,
            speed: self.speed,
            state: self.state,
            angle_min: self.profile.angle_min,
            angle_max: self.profile.angle_max,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

/// Owns every named servo and runs the shared motion tick.
pub struct ServoController {
    servos: HashMap<String, ServoMotion>,
}

impl ServoController {
    pub fn new(servos: HashMap<String, ServoMotion>) -> Self {
        Self { servos }
    }

    #[cfg(test)]
    fn servo(&self, name: &str) -> &ServoMotion {
        &self.servos[name]
    }
}

impl Controller for ServoController {
    fn area(&self) -> Area {
        Area::Servos
    }

    fn poll_interval(&self) -> Duration {
        SERVO_TICK
    }

    fn poll(&mut self) -> Result<bool, RobotError> {
        let mut changed = false;
        for (name, servo) in &mut self.servos {
            match servo.tick() {
                Ok(true) => changed = true,
                Ok(false) => {}
                Err(e) => warn!(servo = %name, error = %e, "servo tick failed"),
            }
        }
        Ok(changed)
    }

    fn apply_ctrl(&mut self, payload: &[u8]) -> Result<bool, RobotError> {
        let diffs: HashMap<String, ServoCtrl> =
            serde_json::from_slice(payload).map_err(|e| RobotError::MalformedMessage {
                topic: "servos/ctrl".to_string(),
                details: e.to_string(),
            })?;

        let mut updated = false;
        for (name, diff) in diffs {
            let Some(servo) = self.servos.get_mut(&name) else {
                debug!(servo = %name, "ctrl for unknown servo ignored");
                continue;
            };
            let (Some(angle), Some(speed)) = (diff.angle, diff.speed) else {
                warn!(servo = %name, "servo ctrl missing angle or speed; entry dropped");
                continue;
            };
            match servo.set_angle(angle, speed) {
                Ok(()) => updated = true,
                Err(e) => warn!(servo = %name, error = %e, "servo command rejected"),
            }
        }
        Ok(updated)
    }

    fn state_payload(&self) -> Result<Vec<u8>, RobotError> {
        let snapshot: HashMap<&str, ServoState> = self
            .servos
            .iter()
            .map(|(name, servo)| (name.as_str(), servo.snapshot()))
            .collect();
        serde_json::to_vec(&snapshot).map_err(|e| RobotError::Channel(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simplebot_hal::SimPwm;

    fn profile() -> ServoProfile {
        ServoProfile {
            pwm_min: 150,
            pwm_max: 600,
            pwm_init: 375,
            angle_range: 180,
            angle_min: -90,
            angle_max: 90,
        }
    }

    fn servo_with_sim() -> (ServoMotion, SimPwm) {
        let sim = SimPwm::new();
        let servo = ServoMotion::new(profile(), Box::new(sim.clone())).unwrap();
        (servo, sim)
    }

    #[test]
    fn construction_drives_initial_pulse() {
        let (servo, sim) = servo_with_sim();
        assert_eq!(sim.last_pulse(), Some(375));
        assert_eq!(servo.state(), ServoMotionState::Idle);
        assert_eq!(servo.angle(), 0);
    }

    #[test]
    fn idle_tick_reports_no_change() {
        let (mut servo, sim) = servo_with_sim();
        assert!(!servo.tick().unwrap());
        assert_eq!(sim.history().len(), 1); // only the init pulse
    }

    #[test]
    fn fast_speed_converges_without_overshoot() {
        // speed 5 => ticks_per_degree 0.2 => five degrees per tick.
        let (mut servo, _sim) = servo_with_sim();
        servo.set_angle(90, 5.0).unwrap();
        assert_eq!(servo.state(), ServoMotionState::Moving);

        let mut became_idle_at = None;
        for tick in 1..=30 {
            servo.tick().unwrap();
            assert!(servo.angle() <= 90, "overshot at tick {tick}");
            if servo.state() == ServoMotionState::Idle && became_idle_at.is_none() {
                became_idle_at = Some(tick);
            }
        }
        assert_eq!(servo.angle(), 90);
        // 90 degrees at 5 degrees per tick: idle exactly on tick 18.
        assert_eq!(became_idle_at, Some(18));
    }

    #[test]
    fn slow_speed_accumulates_ticks_per_degree() {
        // speed 0.5 => one degree every two ticks.
        let (mut servo, _sim) = servo_with_sim();
        servo.set_angle(3, 0.5).unwrap();

        assert!(!servo.tick().unwrap());
        assert!(servo.tick().unwrap());
        assert_eq!(servo.angle(), 1);

        assert!(!servo.tick().unwrap());
        assert!(servo.tick().unwrap());
        assert_eq!(servo.angle(), 2);
    }

    #[test]
    fn target_clamped_to_angle_limits() {
        let (mut servo, _sim) = servo_with_sim();
        servo.set_angle(200, 5.0).unwrap();
        assert_eq!(servo.target_angle(), 90);

        servo.set_angle(-200, 5.0).unwrap();
        assert_eq!(servo.target_angle(), -90);
    }

    #[test]
    fn zero_or_negative_speed_rejected_before_division() {
        let (mut servo, _sim) = servo_with_sim();
        assert!(matches!(servo.set_angle(45, 0.0), Err(RobotError::InvalidSpeed(_))));
        assert!(matches!(servo.set_angle(45, -2.0), Err(RobotError::InvalidSpeed(_))));
        // The rejected command changed nothing.
        assert_eq!(servo.state(), ServoMotionState::Idle);
        assert_eq!(servo.target_angle(), 0);
    }

    #[test]
    fn set_angle_to_current_angle_stays_idle() {
        let (mut servo, _sim) = servo_with_sim();
        servo.set_angle(0, 5.0).unwrap();
        assert_eq!(servo.state(), ServoMotionState::Idle);
    }

    #[test]
    fn moving_backwards_reaches_negative_target() {
        let (mut servo, _sim) = servo_with_sim();
        servo.set_angle(-10, 2.0).unwrap();
        for _ in 0..20 {
            servo.tick().unwrap();
        }
        assert_eq!(servo.angle(), -10);
        assert_eq!(servo.state(), ServoMotionState::Idle);
    }

    #[test]
    fn pulse_follows_linear_map() {
        // span 450 over 180 degrees => 2.5 pulse units per degree, centred.
        let (mut servo, sim) = servo_with_sim();
        servo.set_angle(2, 1.0).unwrap();
        servo.tick().unwrap();
        // angle 1 => 150 + 2.5 * (1 + 90) = 377.5 => 378 rounded.
        assert_eq!(sim.last_pulse(), Some(378));
        servo.tick().unwrap();
        // angle 2 => 150 + 2.5 * 92 = 380.
        assert_eq!(sim.last_pulse(), Some(380));
    }

    #[test]
    fn catch_up_never_steps_past_target() {
        // speed 50 on a 7-degree move: single tick settles exactly on target.
        let (mut servo, _sim) = servo_with_sim();
        servo.set_angle(7, 50.0).unwrap();
        assert!(servo.tick().unwrap());
        assert_eq!(servo.angle(), 7);
        assert_eq!(servo.state(), ServoMotionState::Idle);
    }

    // ── controller level ────────────────────────────────────────────────────

    fn controller() -> (ServoController, SimPwm) {
        let sim = SimPwm::new();
        let mut servos = HashMap::new();
        servos.insert(
            "head".to_string(),
            ServoMotion::new(profile(), Box::new(sim.clone())).unwrap(),
        );
        (ServoController::new(servos), sim)
    }

    #[test]
    fn ctrl_diff_starts_motion_and_polls_move_it() {
        let (mut ctrl, _sim) = controller();
        let updated = ctrl
            .apply_ctrl(br#"{"head": {"angle": 10, "speed": 5.0}}"#)
            .unwrap();
        assert!(updated);
        assert_eq!(ctrl.servo("head").state(), ServoMotionState::Moving);

        assert!(ctrl.poll().unwrap());
        assert_eq!(ctrl.servo("head").angle(), 5);
    }

    #[test]
    fn ctrl_for_unknown_servo_is_ignored() {
        let (mut ctrl, _sim) = controller();
        let updated = ctrl
            .apply_ctrl(br#"{"tail": {"angle": 10, "speed": 5.0}}"#)
            .unwrap();
        assert!(!updated);
    }

    #[test]
    fn ctrl_with_invalid_speed_drops_entry_without_crash() {
        let (mut ctrl, _sim) = controller();
        let updated = ctrl
            .apply_ctrl(br#"{"head": {"angle": 10, "speed": 0.0}}"#)
            .unwrap();
        assert!(!updated);
        assert_eq!(ctrl.servo("head").state(), ServoMotionState::Idle);
    }

    #[test]
    fn malformed_ctrl_payload_errors() {
        let (mut ctrl, _sim) = controller();
        let result = ctrl.apply_ctrl(b"not json");
        assert!(matches!(result, Err(RobotError::MalformedMessage { .. })));
    }

    #[test]
    fn state_payload_round_trips() {
        let (ctrl, _sim) = controller();
        let payload = ctrl.state_payload().unwrap();
        let snapshot: HashMap<String, ServoState> = serde_json::from_slice(&payload).unwrap();
        assert_eq!(snapshot["head"].angle, 0);
        assert_eq!(snapshot["head"].angle_max, 90);
        assert_eq!(snapshot["head"].state, ServoMotionState::Idle);
    }
}
