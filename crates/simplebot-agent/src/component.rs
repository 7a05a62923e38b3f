//! Generic controller task runner.
//!
//! [`run`] is the shared event loop every area controller executes: subscribe
//! to the area's ctrl topic, publish an initial retained snapshot, then react
//! to control diffs and the controller's own periodic poll.  A controller
//! that reports a change after either gets its full state republished —
//! the immediate republish after a ctrl diff is what the client uses as an
//! application-level acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use simplebot_bus::MessageBus;
use simplebot_types::{Area, RobotError};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// One area controller: owns its entities and backends, exercised only from
/// the single task spawned on it.
pub trait Controller: Send {
    fn area(&self) -> Area;

    /// Cadence of [`poll`](Controller::poll).  Defaults to the sensor
    /// sampling period; the servo controller overrides it with its motion
    /// tick.
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(60)
    }

    /// One periodic step.  Returns `true` when the published state is stale
    /// and must be refreshed.  Errors are logged, never fatal.
    fn poll(&mut self) -> Result<bool, RobotError> {
        Ok(false)
    }

    /// Apply a control diff.  Returns `true` to trigger an immediate state
    /// republish.  Malformed payloads must error, not panic.
    fn apply_ctrl(&mut self, _payload: &[u8]) -> Result<bool, RobotError> {
        Ok(false)
    }

    /// Serialize the full-state snapshot for this area.
    fn state_payload(&self) -> Result<Vec<u8>, RobotError>;
}

/// Drive `controller` forever on the given bus.
///
/// Returns only when the bus shuts down or the initial snapshot cannot be
/// published.
pub async fn run<C: Controller>(
    mut controller: C,
    bus: Arc<dyn MessageBus>,
    prefix: &str,
) -> Result<(), RobotError> {
    let area = controller.area();
    let state_topic = area.state_topic(prefix);
    let mut subscription = bus.subscribe(&area.ctrl_topic(prefix));

    // Serialize before the await: the controller is Send but not Sync, so no
    // borrow of it may live across a suspension point.
    let payload = controller.state_payload()?;
    bus.publish(&state_topic, payload, true).await?;
    info!(area = area.wire_name(), "controller started");

    let mut ticker = tokio::time::interval(controller.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let republish = tokio::select! {
            _ = ticker.tick() => {
                match controller.poll() {
                    Ok(changed) => changed,
                    Err(e) => {
                        warn!(area = area.wire_name(), error = %e, "poll failed");
                        false
                    }
                }
            }
            message = subscription.recv() => {
                let Some(message) = message else {
                    return Err(RobotError::Channel(format!(
                        "bus closed for area '{}'", area.wire_name()
                    )));
                };
                match controller.apply_ctrl(&message.payload) {
                    Ok(changed) => changed,
                    // Bad payloads are dropped, cached state stays intact.
                    Err(e) => {
                        warn!(area = area.wire_name(), error = %e, "control message dropped");
                        false
                    }
                }
            }
        };
        if republish {
            let payload = controller.state_payload()?;
            bus.publish(&state_topic, payload, true).await?;
        }
    }
}
