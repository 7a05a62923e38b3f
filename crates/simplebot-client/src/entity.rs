//! Cached client-side entities.
//!
//! Each entity mirrors one named hardware unit: a cached copy of the last
//! snapshot, an observer list fired synchronously on every replace, and (for
//! actuators) a pending-write buffer holding only the fields set since the
//! last flush.  Entities are created by their collection on first snapshot
//! and handed out as `Arc` handles; reads never touch the bus.
//!
//! The inbound task is the sole writer of cached state, so interior locks
//! are held only for single replace/read operations.

use std::sync::{Mutex, PoisonError, RwLock};

use serde_json::{Value, json};
use simplebot_types::{
    AxesState, DistanceState, LedCtrl, LedState, LineState, MotorState, RobotError, ServoCtrl,
    ServoMotionState, ServoState,
};
use tokio::sync::watch;

pub type Observer<S> = Box<dyn Fn(&S) + Send + Sync>;

/// Behavior the collection needs from every entity kind.
pub trait Entity: Send + Sync + Sized + 'static {
    /// Build a fresh entity from its first snapshot.
    fn from_snapshot(name: &str, snapshot: &Value) -> Result<Self, serde_json::Error>;

    /// Replace the cached state with a new snapshot and fire observers.
    fn apply_snapshot(&self, snapshot: &Value) -> Result<(), serde_json::Error>;

    /// Check that a snapshot parses, without touching any state.  The
    /// collection validates a whole payload before applying any of it.
    fn validate_snapshot(snapshot: &Value) -> Result<(), serde_json::Error>;

    /// Drain the pending buffer; `None` when there is nothing to send.
    /// Sensors always return `None`.
    fn take_pending(&self) -> Option<Value> {
        None
    }

    fn name(&self) -> &str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared cached-state cell
// ─────────────────────────────────────────────────────────────────────────────

/// Last snapshot plus the observer list, shared by all entity kinds.
struct CachedState<S> {
    state: RwLock<S>,
    observers: Mutex<Vec<Observer<S>>>,
}

impl<S: Clone> CachedState<S> {
    fn new(initial: S) -> Self {
        Self {
            state: RwLock::new(initial),
            observers: Mutex::new(Vec::new()),
        }
    }

    fn get(&self) -> S {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whole-state replace, then observers in registration order.  Observers
    /// run on the inbound task and must not block.
    fn replace(&self, next: S) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        for observer in self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            observer(&next);
        }
    }

    fn observe(&self, observer: Observer<S>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actuator entities
// ─────────────────────────────────────────────────────────────────────────────

/// One named LED.  Colors are always set as one unit.
pub struct Led {
    name: String,
    cached: CachedState<LedState>,
    pending: Mutex<Option<LedCtrl>>,
}

impl Led {
    /// Last color reported by the hardware.
    pub fn color(&self) -> LedState {
        self.cached.get()
    }

    /// Buffer a color change for the next LED flush.  Later calls in the
    /// same flush cycle win.
    pub fn set_color(&self, red: u8, green: u8, blue: u8) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(LedCtrl { red, green, blue });
    }

    pub fn observe(&self, observer: impl Fn(&LedState) + Send + Sync + 'static) {
        self.cached.observe(Box::new(observer));
    }
}

impl Entity for Led {
    fn from_snapshot(name: &str, snapshot: &Value) -> Result<Self, serde_json::Error> {
        Ok(Self {
            name: name.to_string(),
            cached: CachedState::new(serde_json::from_value(snapshot.clone())?),
            pending: Mutex::new(None),
        })
    }

    fn apply_snapshot(&self, snapshot: &Value) -> Result<(), serde_json::Error> {
        self.cached.replace(serde_json::from_value(snapshot.clone())?);
        Ok(())
    }

    fn validate_snapshot(snapshot: &Value) -> Result<(), serde_json::Error> {
        serde_json::from_value::<LedState>(snapshot.clone()).map(|_| ())
    }

    fn take_pending(&self) -> Option<Value> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|ctrl| json!(ctrl))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// One named servo, with an awaitable "settled" condition.
pub struct Servo {
    name: String,
    cached: CachedState<ServoState>,
    pending: Mutex<ServoCtrl>,
    settled: watch::Sender<bool>,
}

impl Servo {
    pub fn angle(&self) -> i32 {
        self.cached.get().angle
    }

    pub fn target_angle(&self) -> i32 {
        self.cached.get().target_angle
    }

    pub fn motion_state(&self) -> ServoMotionState {
        self.cached.get().state
    }

    /// Full last snapshot.
    pub fn snapshot(&self) -> ServoState {
        self.cached.get()
    }

    /// Buffer a move command for the next servo flush.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::InvalidSpeed`] for `speed <= 0`; the pending
    /// buffer is left untouched.
    pub fn move_to(&self, angle: i32, speed: f32) -> Result<(), RobotError> {
        if speed <= 0.0 {
            return Err(RobotError::InvalidSpeed(speed));
        }
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.angle = Some(angle);
        pending.speed = Some(speed);
        Ok(())
    }

    /// Wait until the latest snapshot reports `angle == target_angle`.
    ///
    /// Returns immediately when the servo is already settled.  Blocks
    /// indefinitely if the bus stops delivering snapshots.
    pub async fn wait_for_target_reached(&self) -> Result<(), RobotError> {
        let mut settled = self.settled.subscribe();
        settled
            .wait_for(|settled| *settled)
            .await
            .map_err(|e| RobotError::Channel(e.to_string()))?;
        Ok(())
    }

    pub fn observe(&self, observer: impl Fn(&ServoState) + Send + Sync + 'static) {
        self.cached.observe(Box::new(observer));
    }
}

impl Entity for Servo {
    fn from_snapshot(name: &str, snapshot: &Value) -> Result<Self, serde_json::Error> {
        let state: ServoState = serde_json::from_value(snapshot.clone())?;
        let (settled, _) = watch::channel(state.angle == state.target_angle);
        Ok(Self {
            name: name.to_string(),
            cached: CachedState::new(state),
            pending: Mutex::new(ServoCtrl::default()),
            settled,
        })
    }

    fn apply_snapshot(&self, snapshot: &Value) -> Result<(), serde_json::Error> {
        let state: ServoState = serde_json::from_value(snapshot.clone())?;
        let settled = state.angle == state.target_angle;
        self.cached.replace(state);
        self.settled.send_replace(settled);
        Ok(())
    }

    fn validate_snapshot(snapshot: &Value) -> Result<(), serde_json::Error> {
        serde_json::from_value::<ServoState>(snapshot.clone()).map(|_| ())
    }

    fn take_pending(&self) -> Option<Value> {
        let drained = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if drained.is_empty() {
            None
        } else {
            Some(json!(drained))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// One named motor.  Speed is signed percent, −100..100.
pub struct Motor {
    name: String,
    cached: CachedState<MotorState>,
    pending: Mutex<Option<f32>>,
}

impl Motor {
    /// Last speed reported by the hardware.
    pub fn speed(&self) -> f32 {
        self.cached.get().speed
    }

    /// Buffer a speed change for the next motor flush, clamped to ±100.
    pub fn set_speed(&self, speed: f32) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(speed.clamp(-100.0, 100.0));
    }

    pub fn observe(&self, observer: impl Fn(&MotorState) + Send + Sync + 'static) {
        self.cached.observe(Box::new(observer));
    }
}

impl Entity for Motor {
    fn from_snapshot(name: &str, snapshot: &Value) -> Result<Self, serde_json::Error> {
        Ok(Self {
            name: name.to_string(),
            cached: CachedState::new(serde_json::from_value(snapshot.clone())?),
            pending: Mutex::new(None),
        })
    }

    fn apply_snapshot(&self, snapshot: &Value) -> Result<(), serde_json::Error> {
        self.cached.replace(serde_json::from_value(snapshot.clone())?);
        Ok(())
    }

    fn validate_snapshot(snapshot: &Value) -> Result<(), serde_json::Error> {
        serde_json::from_value::<MotorState>(snapshot.clone()).map(|_| ())
    }

    fn take_pending(&self) -> Option<Value> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|speed| json!({ "speed": speed }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sensor entities
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! sensor_entity {
    ($(#[$doc:meta])* $entity:ident, $state:ty, $getter:ident -> $value:ty, $field:ident) => {
        $(#[$doc])*
        pub struct $entity {
            name: String,
            cached: CachedState<$state>,
        }

        impl $entity {
            pub fn $getter(&self) -> $value {
                self.cached.get().$field
            }

            pub fn observe(&self, observer: impl Fn(&$state) + Send + Sync + 'static) {
                self.cached.observe(Box::new(observer));
            }
        }

        impl Entity for $entity {
            fn from_snapshot(name: &str, snapshot: &Value) -> Result<Self, serde_json::Error> {
                Ok(Self {
                    name: name.to_string(),
                    cached: CachedState::new(serde_json::from_value(snapshot.clone())?),
                })
            }

            fn apply_snapshot(&self, snapshot: &Value) -> Result<(), serde_json::Error> {
                self.cached.replace(serde_json::from_value(snapshot.clone())?);
                Ok(())
            }

            fn validate_snapshot(snapshot: &Value) -> Result<(), serde_json::Error> {
                serde_json::from_value::<$state>(snapshot.clone()).map(|_| ())
            }

            fn name(&self) -> &str {
                &self.name
            }
        }
    };
}

sensor_entity!(
    /// One named distance sensor; reading in metres.
    DistanceSensor, DistanceState, distance -> f32, distance
);
sensor_entity!(
    /// One named line sensor.
    LineSensor, LineState, line_detected -> bool, line
);

/// One named 3-axis sensor (magnetometer or accelerometer).
pub struct VectorSensor {
    name: String,
    cached: CachedState<AxesState>,
}

impl VectorSensor {
    pub fn reading(&self) -> AxesState {
        self.cached.get()
    }

    pub fn observe(&self, observer: impl Fn(&AxesState) + Send + Sync + 'static) {
        self.cached.observe(Box::new(observer));
    }
}

impl Entity for VectorSensor {
    fn from_snapshot(name: &str, snapshot: &Value) -> Result<Self, serde_json::Error> {
        Ok(Self {
            name: name.to_string(),
            cached: CachedState::new(serde_json::from_value(snapshot.clone())?),
        })
    }

    fn apply_snapshot(&self, snapshot: &Value) -> Result<(), serde_json::Error> {
        self.cached.replace(serde_json::from_value(snapshot.clone())?);
        Ok(())
    }

    fn validate_snapshot(snapshot: &Value) -> Result<(), serde_json::Error> {
        serde_json::from_value::<AxesState>(snapshot.clone()).map(|_| ())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
