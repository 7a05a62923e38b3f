//! Agent configuration, loaded from a TOML file.
//!
//! The file declares the broker plus every named entity the agent exposes.
//! Hardware backends are injected separately; config only carries the
//! numbers a backend-agnostic controller needs (servo profiles, the LED
//! layout, pin/channel assignments for the embedder).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use simplebot_bus::BrokerUrl;
use simplebot_types::RobotError;

use crate::servo::ServoProfile;

/// Startup configuration for the hardware agent.
///
/// ```toml
/// [broker]
/// url = "mqtt://localhost"
/// topic_prefix = "robot"
///
/// [servos.head]
/// channel = 0
/// angle_min = -90
/// angle_max = 90
///
/// [motors.left]
/// channel = 1
///
/// [leds]
/// layout = { front = 0, back = 2 }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub servos: HashMap<String, ServoConfig>,
    #[serde(default)]
    pub motors: HashMap<String, MotorConfig>,
    #[serde(default)]
    pub leds: LedConfig,
    #[serde(default)]
    pub distance_sensors: HashMap<String, DistanceSensorConfig>,
    #[serde(default)]
    pub line_sensors: HashMap<String, LineSensorConfig>,
    #[serde(default)]
    pub magnetometers: HashMap<String, VectorSensorConfig>,
    #[serde(default)]
    pub accelerometers: HashMap<String, VectorSensorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_url")]
    pub url: String,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

fn default_broker_url() -> String {
    "mqtt://localhost".to_string()
}
fn default_topic_prefix() -> String {
    "robot".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            topic_prefix: default_topic_prefix(),
        }
    }
}

/// One servo: PWM channel assignment plus its motion profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServoConfig {
    pub channel: u8,
    #[serde(default = "default_pwm_min")]
    pub pwm_min: u16,
    #[serde(default = "default_pwm_max")]
    pub pwm_max: u16,
    #[serde(default = "default_pwm_init")]
    pub pwm_init: u16,
    #[serde(default = "default_angle_range")]
    pub angle_range: i32,
    #[serde(default = "default_angle_min")]
    pub angle_min: i32,
    #[serde(default = "default_angle_max")]
    pub angle_max: i32,
}

fn default_pwm_min() -> u16 {
    150
}
fn default_pwm_max() -> u16 {
    600
}
fn default_pwm_init() -> u16 {
    375
}
fn default_angle_range() -> i32 {
    180
}
fn default_angle_min() -> i32 {
    -90
}
fn default_angle_max() -> i32 {
    90
}

impl ServoConfig {
    pub fn profile(&self) -> ServoProfile {
        ServoProfile {
            pwm_min: self.pwm_min,
            pwm_max: self.pwm_max,
            pwm_init: self.pwm_init,
            angle_range: self.angle_range,
            angle_min: self.angle_min,
            angle_max: self.angle_max,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorConfig {
    pub channel: u8,
}

/// LED area: strip-wide startup brightness and the name → pixel-index map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedConfig {
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    #[serde(default)]
    pub layout: HashMap<String, usize>,
}

fn default_brightness() -> u8 {
    255
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            brightness: default_brightness(),
            layout: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceSensorConfig {
    pub trigger_pin: u8,
    pub echo_pin: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSensorConfig {
    pub pin: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSensorConfig {
    pub i2c_address: u8,
}

impl AgentConfig {
    /// Load from a TOML file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::Config`] when the file cannot be read or parsed,
    /// or when a value fails validation.
    pub fn load(path: &Path) -> Result<Self, RobotError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            RobotError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config: AgentConfig = toml::from_str(&raw)
            .map_err(|e| RobotError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SIMPLEBOT_*` environment variable overrides.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `SIMPLEBOT_BROKER_URL` | `broker.url` |
    /// | `SIMPLEBOT_TOPIC_PREFIX` | `broker.topic_prefix` |
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SIMPLEBOT_BROKER_URL") {
            self.broker.url = v;
        }
        if let Ok(v) = std::env::var("SIMPLEBOT_TOPIC_PREFIX") {
            self.broker.topic_prefix = v;
        }
    }

    fn validate(&self) -> Result<(), RobotError> {
        BrokerUrl::parse(&self.broker.url)?;
        let prefix = &self.broker.topic_prefix;
        if prefix.is_empty() || prefix.contains('/') || prefix.contains('+') {
            return Err(RobotError::Config(format!("invalid topic prefix '{prefix}'")));
        }
        for (name, servo) in &self.servos {
            if servo.pwm_max <= servo.pwm_min {
                return Err(RobotError::Config(format!(
                    "servo '{name}': pwm_max must exceed pwm_min"
                )));
            }
            if servo.angle_range <= 0 || servo.angle_min >= servo.angle_max {
                return Err(RobotError::Config(format!(
                    "servo '{name}': bad angle limits"
                )));
            }
        }
        Ok(())
    }

    /// The parsed broker URL.
    pub fn broker_url(&self) -> Result<BrokerUrl, RobotError> {
        BrokerUrl::parse(&self.broker.url)
    }
}
