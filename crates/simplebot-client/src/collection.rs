//! Named entity collections.
//!
//! A collection maps entity names to `Arc` handles for one area.  Entries
//! are created on the first snapshot naming them and never removed; a
//! monotonic snapshot sequence (a `watch` counter bumped on every applied
//! payload) lets callers await "the next full snapshot after now", which is
//! how the servo flush acknowledgement works.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use simplebot_types::RobotError;
use tokio::sync::watch;

use crate::entity::Entity;

pub struct EntityCollection<E: Entity> {
    entities: RwLock<HashMap<String, Arc<E>>>,
    sequence: watch::Sender<u64>,
}

impl<E: Entity> Default for EntityCollection<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> EntityCollection<E> {
    pub fn new() -> Self {
        let (sequence, _) = watch::channel(0);
        Self {
            entities: RwLock::new(HashMap::new()),
            sequence,
        }
    }

    /// Handle to a known entity.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::UnknownEntity`] for a name never seen in any
    /// snapshot.
    pub fn get(&self, name: &str) -> Result<Arc<E>, RobotError> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RobotError::UnknownEntity(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<E>> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge one full-area snapshot: create-or-replace per named entity,
    /// then bump the snapshot sequence.
    pub fn update_from_message(&self, topic: &str, payload: &[u8]) -> Result<(), RobotError> {
        let snapshots: HashMap<String, Value> =
            serde_json::from_slice(payload).map_err(|e| RobotError::MalformedMessage {
                topic: topic.to_string(),
                details: e.to_string(),
            })?;
        self.update_from_values(topic, snapshots)
    }

    pub(crate) fn update_from_values(
        &self,
        topic: &str,
        snapshots: HashMap<String, Value>,
    ) -> Result<(), RobotError> {
        // Validate the whole batch first: a payload mixing good and bad
        // entries must leave every cache untouched.
        for (name, snapshot) in &snapshots {
            E::validate_snapshot(snapshot).map_err(|e| RobotError::MalformedMessage {
                topic: topic.to_string(),
                details: format!("entity '{name}': {e}"),
            })?;
        }
        for (name, snapshot) in snapshots {
            let malformed = |e: serde_json::Error| RobotError::MalformedMessage {
                topic: topic.to_string(),
                details: format!("entity '{name}': {e}"),
            };
            // Replace outside the map lock: observers may call back into the
            // collection.
            let existing = self
                .entities
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&name)
                .cloned();
            match existing {
                Some(entity) => entity.apply_snapshot(&snapshot).map_err(malformed)?,
                None => {
                    let entity = Arc::new(E::from_snapshot(&name, &snapshot).map_err(malformed)?);
                    self.entities
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(name, entity);
                }
            }
        }
        self.sequence.send_modify(|sequence| *sequence += 1);
        Ok(())
    }

    /// Receiver over the monotonic snapshot sequence.
    pub fn sequence(&self) -> watch::Receiver<u64> {
        self.sequence.subscribe()
    }

    /// Drain every entity's pending buffer into one aggregate diff.  Empty
    /// map when nothing was pending.
    pub fn build_outbound_diff(&self) -> serde_json::Map<String, Value> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        let mut diff = serde_json::Map::new();
        for (name, entity) in entities.iter() {
            if let Some(pending) = entity.take_pending() {
                diff.insert(name.clone(), pending);
            }
        }
        diff
    }
}
