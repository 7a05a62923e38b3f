//! The `Robot` client: connection, handshake, and per-area flushes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use simplebot_bus::{BusSubscription, MessageBus};
use simplebot_types::{Area, LedAreaState, RobotError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collection::EntityCollection;
use crate::entity::{DistanceSensor, Led, LineSensor, Motor, Servo, VectorSensor};

/// Motor names the drive helpers steer.
const LEFT_MOTOR: &str = "left";
const RIGHT_MOTOR: &str = "right";

/// Every cached collection, written only by the inbound task.
struct Mirror {
    servos: EntityCollection<Servo>,
    motors: EntityCollection<Motor>,
    leds: EntityCollection<Led>,
    distance_sensors: EntityCollection<DistanceSensor>,
    line_sensors: EntityCollection<LineSensor>,
    magnetometers: EntityCollection<VectorSensor>,
    accelerometers: EntityCollection<VectorSensor>,
    /// Strip-wide brightness from the latest LED snapshot.
    brightness: Mutex<u8>,
}

impl Mirror {
    fn new() -> Self {
        Self {
            servos: EntityCollection::new(),
            motors: EntityCollection::new(),
            leds: EntityCollection::new(),
            distance_sensors: EntityCollection::new(),
            line_sensors: EntityCollection::new(),
            magnetometers: EntityCollection::new(),
            accelerometers: EntityCollection::new(),
            brightness: Mutex::new(0),
        }
    }

    fn apply(&self, area: Area, topic: &str, payload: &[u8]) -> Result<(), RobotError> {
        match area {
            Area::Servos => self.servos.update_from_message(topic, payload),
            Area::Motors => self.motors.update_from_message(topic, payload),
            Area::DistanceSensors => self.distance_sensors.update_from_message(topic, payload),
            Area::LineSensors => self.line_sensors.update_from_message(topic, payload),
            Area::Magnetometers => self.magnetometers.update_from_message(topic, payload),
            Area::Accelerometers => self.accelerometers.update_from_message(topic, payload),
            // The LED snapshot carries a scalar brightness beside the
            // per-LED map; unpack before merging.
            Area::Leds => {
                let malformed = |details: String| RobotError::MalformedMessage {
                    topic: topic.to_string(),
                    details,
                };
                let state: LedAreaState =
                    serde_json::from_slice(payload).map_err(|e| malformed(e.to_string()))?;
                *self.brightness.lock().unwrap_or_else(PoisonError::into_inner) =
                    state.brightness;
                let values = state
                    .leds
                    .into_iter()
                    .map(|(name, led)| Ok((name, serde_json::to_value(led)?)))
                    .collect::<Result<HashMap<String, Value>, serde_json::Error>>()
                    .map_err(|e| malformed(e.to_string()))?;
                self.leds.update_from_values(topic, values)
            }
        }
    }
}

/// Connected client handle.  Dropping it stops the inbound task.
pub struct Robot {
    bus: Arc<dyn MessageBus>,
    prefix: String,
    mirror: Arc<Mirror>,
    inbound: JoinHandle<()>,
}

impl Robot {
    /// Connect and run the startup handshake: subscribe to every state
    /// topic, then block until each entity area has delivered at least one
    /// full snapshot.  Unblocks exactly once; later snapshots only refresh
    /// the mirror.
    ///
    /// Blocks indefinitely if the agent never publishes (documented
    /// limitation: no timeout, no reconnection).
    pub async fn connect(bus: Arc<dyn MessageBus>, prefix: &str) -> Result<Self, RobotError> {
        let subscription = bus.subscribe(&format!("{prefix}/+/state"));
        let mirror = Arc::new(Mirror::new());
        let (ready_tx, mut ready_rx) = watch::channel(false);
        let inbound = tokio::spawn(inbound_loop(subscription, mirror.clone(), ready_tx));

        ready_rx
            .wait_for(|ready| *ready)
            .await
            .map_err(|e| RobotError::Channel(format!("bus closed during handshake: {e}")))?;
        info!(prefix, "handshake complete");

        Ok(Self {
            bus,
            prefix: prefix.to_string(),
            mirror,
            inbound,
        })
    }

    // ── cached collections ──────────────────────────────────────────────────

    pub fn servos(&self) -> &EntityCollection<Servo> {
        &self.mirror.servos
    }

    pub fn motors(&self) -> &EntityCollection<Motor> {
        &self.mirror.motors
    }

    pub fn leds(&self) -> &EntityCollection<Led> {
        &self.mirror.leds
    }

    pub fn distance_sensors(&self) -> &EntityCollection<DistanceSensor> {
        &self.mirror.distance_sensors
    }

    pub fn line_sensors(&self) -> &EntityCollection<LineSensor> {
        &self.mirror.line_sensors
    }

    pub fn magnetometers(&self) -> &EntityCollection<VectorSensor> {
        &self.mirror.magnetometers
    }

    pub fn accelerometers(&self) -> &EntityCollection<VectorSensor> {
        &self.mirror.accelerometers
    }

    /// Strip-wide LED brightness from the latest snapshot.
    pub fn brightness(&self) -> u8 {
        *self
            .mirror
            .brightness
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── flushes ─────────────────────────────────────────────────────────────

    /// Publish every pending motor speed as one aggregate diff.  No pending
    /// writes, no traffic.
    pub async fn flush_motors(&self) -> Result<(), RobotError> {
        let diff = self.mirror.motors.build_outbound_diff();
        self.publish_ctrl(Area::Motors, diff).await
    }

    /// Publish pending LED colors, optionally with a new strip brightness.
    /// A brightness alone still makes the message non-empty.
    pub async fn flush_leds(&self, brightness: Option<u8>) -> Result<(), RobotError> {
        let mut diff = self.mirror.leds.build_outbound_diff();
        if let Some(brightness) = brightness {
            diff.insert("brightness".to_string(), Value::from(brightness));
        }
        self.publish_ctrl(Area::Leds, diff).await
    }

    /// Publish pending servo commands, then wait for the agent's
    /// acknowledgement: the full servo snapshot it republishes immediately
    /// after applying a ctrl diff.  Distinct from
    /// [`Servo::wait_for_target_reached`] — the servo may still be moving
    /// when this returns.
    pub async fn flush_servos(&self) -> Result<(), RobotError> {
        let diff = self.mirror.servos.build_outbound_diff();
        if diff.is_empty() {
            return Ok(());
        }
        let mut sequence = self.mirror.servos.sequence();
        let current = *sequence.borrow_and_update();

        self.publish_ctrl(Area::Servos, diff).await?;

        sequence
            .wait_for(|sequence| *sequence > current)
            .await
            .map_err(|e| RobotError::Channel(format!("bus closed awaiting servo ack: {e}")))?;
        Ok(())
    }

    async fn publish_ctrl(
        &self,
        area: Area,
        diff: serde_json::Map<String, Value>,
    ) -> Result<(), RobotError> {
        if diff.is_empty() {
            return Ok(());
        }
        let payload =
            serde_json::to_vec(&diff).map_err(|e| RobotError::Channel(e.to_string()))?;
        self.bus
            .publish(&area.ctrl_topic(&self.prefix), payload, false)
            .await
    }

    // ── waits ───────────────────────────────────────────────────────────────

    /// Wait until every known servo reports `angle == target_angle`.
    pub async fn wait_for_servos(&self) -> Result<(), RobotError> {
        for servo in self.mirror.servos.all() {
            servo.wait_for_target_reached().await?;
        }
        Ok(())
    }

    // ── drive helpers ───────────────────────────────────────────────────────

    pub async fn forward(&self, speed: f32) -> Result<(), RobotError> {
        self.drive(speed, speed).await
    }

    pub async fn backward(&self, speed: f32) -> Result<(), RobotError> {
        self.drive(-speed, -speed).await
    }

    pub async fn rotate_left(&self, speed: f32) -> Result<(), RobotError> {
        self.drive(-speed, speed).await
    }

    pub async fn rotate_right(&self, speed: f32) -> Result<(), RobotError> {
        self.drive(speed, -speed).await
    }

    pub async fn stop(&self) -> Result<(), RobotError> {
        self.drive(0.0, 0.0).await
    }

    async fn drive(&self, left: f32, right: f32) -> Result<(), RobotError> {
        self.mirror.motors.get(LEFT_MOTOR)?.set_speed(left);
        self.mirror.motors.get(RIGHT_MOTOR)?.set_speed(right);
        self.flush_motors().await
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        self.inbound.abort();
    }
}

async fn inbound_loop(
    mut subscription: BusSubscription,
    mirror: Arc<Mirror>,
    ready: watch::Sender<bool>,
) {
    let mut seen: HashSet<Area> = HashSet::new();
    while let Some(message) = subscription.recv().await {
        let Some(area) = message.topic.split('/').nth(1).and_then(Area::from_wire) else {
            debug!(topic = %message.topic, "snapshot for unknown area ignored");
            continue;
        };
        match mirror.apply(area, &message.topic, &message.payload) {
            Ok(()) => {
                if seen.insert(area) && seen.len() == Area::ALL.len() {
                    let _ = ready.send(true);
                }
            }
            // Cached state stays intact; the next good snapshot heals it.
            Err(e) => warn!(topic = %message.topic, error = %e, "snapshot dropped"),
        }
    }
    debug!("inbound loop ended: bus closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use simplebot_agent::{
        DistanceSensorController, LedController, LineSensorController, MotorController,
        ServoController, ServoMotion, ServoProfile, VectorSensorController, run,
    };
    use simplebot_bus::MemoryBus;
    use simplebot_hal::{
        DistanceProbe, LineProbe, MotorDrive, SimDistanceProbe, SimLineProbe, SimMotor,
        SimPixelStrip, SimPwm, SimVectorProbe, VectorProbe,
    };
    use simplebot_types::{AxesState, LedState, ServoMotionState};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    struct AgentHandles {
        left: SimMotor,
        right: SimMotor,
        head_pwm: SimPwm,
        strip: SimPixelStrip,
        distance: SimDistanceProbe,
    }

    /// Spawn the full hardware agent over the given bus, all sim backends.
    fn spawn_agent(bus: &Arc<MemoryBus>) -> AgentHandles {
        let bus_dyn = |bus: &Arc<MemoryBus>| bus.clone() as Arc<dyn MessageBus>;

        let head_pwm = SimPwm::new();
        let profile = ServoProfile {
            pwm_min: 150,
            pwm_max: 600,
            pwm_init: 375,
            angle_range: 180,
            angle_min: -90,
            angle_max: 90,
        };
        let mut servos = HashMap::new();
        servos.insert(
            "head".to_string(),
            ServoMotion::new(profile, Box::new(head_pwm.clone())).unwrap(),
        );
        tokio::spawn(run(ServoController::new(servos), bus_dyn(bus), "robot"));

        let left = SimMotor::new();
        let right = SimMotor::new();
        let mut drives: HashMap<String, Box<dyn MotorDrive>> = HashMap::new();
        drives.insert("left".to_string(), Box::new(left.clone()));
        drives.insert("right".to_string(), Box::new(right.clone()));
        tokio::spawn(run(
            MotorController::new(drives).unwrap(),
            bus_dyn(bus),
            "robot",
        ));

        let strip = SimPixelStrip::new(3, 255);
        let layout = HashMap::from([("front".to_string(), 0), ("back".to_string(), 2)]);
        tokio::spawn(run(
            LedController::new(Box::new(strip.clone()), layout).unwrap(),
            bus_dyn(bus),
            "robot",
        ));

        let distance = SimDistanceProbe::new(0.5);
        let mut probes: HashMap<String, Box<dyn DistanceProbe>> = HashMap::new();
        probes.insert("front".to_string(), Box::new(distance.clone()));
        tokio::spawn(run(
            DistanceSensorController::new(probes),
            bus_dyn(bus),
            "robot",
        ));

        let line = SimLineProbe::new();
        let mut probes: HashMap<String, Box<dyn LineProbe>> = HashMap::new();
        probes.insert("center".to_string(), Box::new(line.clone()));
        tokio::spawn(run(
            LineSensorController::new(probes).unwrap(),
            bus_dyn(bus),
            "robot",
        ));

        let mag = SimVectorProbe::new(AxesState { x: 1.0, y: 2.0, z: 3.0 });
        let mut probes: HashMap<String, Box<dyn VectorProbe>> = HashMap::new();
        probes.insert("main".to_string(), Box::new(mag.clone()));
        tokio::spawn(run(
            VectorSensorController::magnetometers(probes).unwrap(),
            bus_dyn(bus),
            "robot",
        ));

        let accel = SimVectorProbe::default();
        let mut probes: HashMap<String, Box<dyn VectorProbe>> = HashMap::new();
        probes.insert("main".to_string(), Box::new(accel.clone()));
        tokio::spawn(run(
            VectorSensorController::accelerometers(probes).unwrap(),
            bus_dyn(bus),
            "robot",
        ));

        AgentHandles { left, right, head_pwm, strip, distance }
    }

    async fn connect(bus: &Arc<MemoryBus>) -> Robot {
        timeout(WAIT, Robot::connect(bus.clone() as Arc<dyn MessageBus>, "robot"))
            .await
            .expect("handshake in time")
            .expect("connect")
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn handshake_populates_every_collection() {
        let bus = Arc::new(MemoryBus::default());
        let _agent = spawn_agent(&bus);
        let robot = connect(&bus).await;

        assert!(robot.servos().get("head").is_ok());
        assert!(robot.motors().get("left").is_ok());
        assert!(robot.motors().get("right").is_ok());
        assert!(robot.leds().get("front").is_ok());
        assert!(robot.distance_sensors().get("front").is_ok());
        assert!(robot.line_sensors().get("center").is_ok());
        assert!(robot.magnetometers().get("main").is_ok());
        assert!(robot.accelerometers().get("main").is_ok());
        assert_eq!(robot.brightness(), 255);

        assert!(matches!(
            robot.motors().get("middle"),
            Err(RobotError::UnknownEntity(_))
        ));
    }

    #[tokio::test]
    async fn motor_flush_reaches_hardware_and_mirror() {
        let bus = Arc::new(MemoryBus::default());
        let agent = spawn_agent(&bus);
        let robot = connect(&bus).await;

        robot.forward(50.0).await.unwrap();
        eventually(|| (agent.left.throttle() - 0.5).abs() < 1e-4).await;
        eventually(|| (agent.right.throttle() - 0.5).abs() < 1e-4).await;
        // The agent's ack snapshot refreshes the mirror.
        let left = robot.motors().get("left").unwrap();
        eventually(move || (left.speed() - 50.0).abs() < 1e-4).await;

        robot.rotate_left(30.0).await.unwrap();
        eventually(|| (agent.left.throttle() + 0.3).abs() < 1e-4).await;
        eventually(|| (agent.right.throttle() - 0.3).abs() < 1e-4).await;

        robot.stop().await.unwrap();
        eventually(|| agent.left.throttle().abs() < 1e-4).await;
    }

    #[tokio::test]
    async fn empty_flush_publishes_nothing() {
        let bus = Arc::new(MemoryBus::default());
        let _agent = spawn_agent(&bus);
        let robot = connect(&bus).await;

        let mut ctrl = bus.subscribe("robot/motors/ctrl");
        robot.flush_motors().await.unwrap();
        robot.flush_servos().await.unwrap();
        let result = timeout(Duration::from_millis(100), ctrl.recv()).await;
        assert!(result.is_err(), "no pending writes, no traffic");
    }

    #[tokio::test]
    async fn servo_flush_acks_then_motion_completes() {
        let bus = Arc::new(MemoryBus::default());
        let agent = spawn_agent(&bus);
        let robot = connect(&bus).await;

        let head = robot.servos().get("head").unwrap();
        head.move_to(90, 5.0).unwrap();
        timeout(WAIT, robot.flush_servos()).await.expect("ack in time").unwrap();

        // The ack reflects the applied command even though motion continues.
        assert_eq!(head.target_angle(), 90);
        assert_eq!(head.motion_state(), ServoMotionState::Moving);

        timeout(WAIT, robot.wait_for_servos()).await.expect("settles").unwrap();
        assert_eq!(head.angle(), 90);
        // angle 90 maps to the top of the pulse range.
        assert_eq!(agent.head_pwm.last_pulse(), Some(600));
    }

    #[tokio::test]
    async fn led_flush_with_brightness() {
        let bus = Arc::new(MemoryBus::default());
        let agent = spawn_agent(&bus);
        let robot = connect(&bus).await;

        robot.leds().get("front").unwrap().set_color(255, 0, 10);
        robot.flush_leds(Some(64)).await.unwrap();

        eventually(|| agent.strip.pixel(0) == Some(LedState { red: 255, green: 0, blue: 10 }))
            .await;
        // The ack snapshot carries the new brightness back to the mirror.
        eventually(|| robot.brightness() == 64).await;
    }

    #[tokio::test]
    async fn sensor_updates_flow_into_the_mirror() {
        let bus = Arc::new(MemoryBus::default());
        let agent = spawn_agent(&bus);
        let robot = connect(&bus).await;

        agent.distance.set_distance(1.25);
        let front = robot.distance_sensors().get("front").unwrap();
        eventually(move || (front.distance() - 1.25).abs() < 1e-4).await;
    }
}
