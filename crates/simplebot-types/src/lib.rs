//! Shared wire types for the simplebot stack.
//!
//! Both sides of the bus speak the same JSON payloads: the hardware agent
//! publishes full-state *snapshots* on `{prefix}/{area}/state` and the client
//! publishes partial *diffs* on `{prefix}/{area}/ctrl`.  The snapshot and
//! ctrl structs live here so agent and client cannot drift apart.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Areas
// ─────────────────────────────────────────────────────────────────────────────

/// A named group of same-kind entities, each with its own pair of bus topics.
///
/// The wire name of an area is not always its local (collection) name: the
/// sensor areas were historically published without underscores, so
/// [`Area::from_wire`] carries the alias table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    Servos,
    Motors,
    Leds,
    DistanceSensors,
    LineSensors,
    Magnetometers,
    Accelerometers,
}

impl Area {
    /// Every area, in a fixed order.  The startup handshake requires one
    /// snapshot from each of these before the client unblocks.
    pub const ALL: [Area; 7] = [
        Area::Servos,
        Area::Motors,
        Area::Leds,
        Area::DistanceSensors,
        Area::LineSensors,
        Area::Magnetometers,
        Area::Accelerometers,
    ];

    /// The segment used in bus topics.
    pub fn wire_name(self) -> &'static str {
        match self {
            Area::Servos => "servos",
            Area::Motors => "motors",
            Area::Leds => "leds",
            Area::DistanceSensors => "distancesensors",
            Area::LineSensors => "linesensors",
            Area::Magnetometers => "magnetometers",
            Area::Accelerometers => "accelerometers",
        }
    }

    /// The client-side collection name.
    pub fn local_name(self) -> &'static str {
        match self {
            Area::DistanceSensors => "distance_sensors",
            Area::LineSensors => "line_sensors",
            other => other.wire_name(),
        }
    }

    /// Resolve a topic segment to an area.  Accepts both the wire spelling
    /// (`"distancesensors"`) and the local spelling (`"distance_sensors"`).
    pub fn from_wire(segment: &str) -> Option<Area> {
        match segment {
            "servos" => Some(Area::Servos),
            "motors" => Some(Area::Motors),
            "leds" => Some(Area::Leds),
            "distancesensors" | "distance_sensors" => Some(Area::DistanceSensors),
            "linesensors" | "line_sensors" => Some(Area::LineSensors),
            "magnetometers" => Some(Area::Magnetometers),
            "accelerometers" => Some(Area::Accelerometers),
            _ => None,
        }
    }

    /// Topic carrying full-state snapshots, hardware → client.  Published
    /// retained so a late subscriber immediately sees the last known state.
    pub fn state_topic(self, prefix: &str) -> String {
        format!("{prefix}/{}/state", self.wire_name())
    }

    /// Topic carrying control diffs, client → hardware.
    pub fn ctrl_topic(self, prefix: &str) -> String {
        format!("{prefix}/{}/ctrl", self.wire_name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot (state) payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Cached color of a single LED.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedState {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// Motion phase of a servo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServoMotionState {
    #[default]
    Idle,
    Moving,
}

/// Full authoritative state of one servo, as published by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServoState {
    pub angle: i32,
    pub target_angle: i32,
    pub speed: f32,
    pub state: ServoMotionState,
    pub angle_min: i32,
    pub angle_max: i32,
}

/// Signed motor speed, −100 (full reverse) to 100 (full forward).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorState {
    pub speed: f32,
}

/// Latest distance reading in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceState {
    pub distance: f32,
}

/// Latest line-detection reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineState {
    pub line: bool,
}

/// A 3-axis reading (magnetometer or accelerometer).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxesState {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// The LED area snapshot is structurally special: a scalar strip brightness
/// sits alongside the per-LED map and must be unpacked before merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedAreaState {
    pub brightness: u8,
    pub leds: HashMap<String, LedState>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Ctrl (diff) payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Commanded color for one LED.  Colors are always set as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedCtrl {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// Pending servo command fields.  Only fields explicitly set since the last
/// flush appear on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ServoCtrl {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

impl ServoCtrl {
    pub fn is_empty(&self) -> bool {
        self.angle.is_none() && self.speed.is_none()
    }
}

/// Commanded motor speed.  The agent accepts both the structured form
/// `{"speed": 30.0}` and a bare number; the client always sends the
/// structured form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MotorCtrl {
    Fields { speed: f32 },
    Bare(f32),
}

impl MotorCtrl {
    pub fn speed(self) -> f32 {
        match self {
            MotorCtrl::Fields { speed } => speed,
            MotorCtrl::Bare(speed) => speed,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type spanning transport, protocol, and hardware failures.
#[derive(Error, Debug)]
pub enum RobotError {
    /// Unsupported broker URL or unreachable bus.  Fatal at startup.
    #[error("connection error for '{url}': {details}")]
    Connection { url: String, details: String },

    /// A command or query referenced a name never seen in any snapshot.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// A payload failed to parse or omitted required fields.  Logged and
    /// dropped by receive loops, never propagated out of them.
    #[error("malformed message on '{topic}': {details}")]
    MalformedMessage { topic: String, details: String },

    /// Zero or negative speed passed to a motion command.
    #[error("invalid speed {0}: must be positive")]
    InvalidSpeed(f32),

    /// A hardware backend rejected an operation.
    #[error("hardware fault on {component}: {details}")]
    Hardware { component: String, details: String },

    /// Missing or unparseable configuration.  Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Bus channel failure (closed or shut down).
    #[error("bus channel error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_alias_table_resolves_sensor_areas() {
        assert_eq!(Area::from_wire("distancesensors"), Some(Area::DistanceSensors));
        assert_eq!(Area::from_wire("distance_sensors"), Some(Area::DistanceSensors));
        assert_eq!(Area::from_wire("linesensors"), Some(Area::LineSensors));
        assert_eq!(Area::from_wire("servos"), Some(Area::Servos));
        assert_eq!(Area::from_wire("thrusters"), None);
    }

    #[test]
    fn area_topics_follow_prefix_scheme() {
        assert_eq!(Area::Servos.state_topic("robot"), "robot/servos/state");
        assert_eq!(Area::DistanceSensors.ctrl_topic("robot"), "robot/distancesensors/ctrl");
    }

    #[test]
    fn servo_state_wire_shape() {
        let state = ServoState {
            angle: 10,
            target_angle: 90,
            speed: 5.0,
            state: ServoMotionState::Moving,
            angle_min: -90,
            angle_max: 90,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "moving");
        assert_eq!(json["target_angle"], 90);

        let back: ServoState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn servo_ctrl_omits_unset_fields() {
        let ctrl = ServoCtrl { angle: Some(45), speed: None };
        let json = serde_json::to_string(&ctrl).unwrap();
        assert_eq!(json, r#"{"angle":45}"#);
        assert!(ServoCtrl::default().is_empty());
    }

    #[test]
    fn motor_ctrl_accepts_both_encodings() {
        let structured: MotorCtrl = serde_json::from_str(r#"{"speed": 30.0}"#).unwrap();
        assert!((structured.speed() - 30.0).abs() < f32::EPSILON);

        let bare: MotorCtrl = serde_json::from_str("-55").unwrap();
        assert!((bare.speed() - (-55.0)).abs() < f32::EPSILON);
    }

    #[test]
    fn led_area_state_unpacks_brightness_and_map() {
        let json = r#"{"brightness": 128, "leds": {"left": {"red": 255, "green": 0, "blue": 10}}}"#;
        let state: LedAreaState = serde_json::from_str(json).unwrap();
        assert_eq!(state.brightness, 128);
        assert_eq!(state.leds["left"].red, 255);
        assert_eq!(state.leds["left"].blue, 10);
    }

    #[test]
    fn robot_error_display() {
        let err = RobotError::UnknownEntity("head".to_string());
        assert!(err.to_string().contains("unknown entity 'head'"));

        let err = RobotError::InvalidSpeed(-1.0);
        assert!(err.to_string().contains("must be positive"));
    }
}
