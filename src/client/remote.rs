//! Remote players as seen by this client
//!
//! Each snapshot overwrites the entity's interpolation target; the displayed
//! transform then closes a fixed fraction of the remaining gap every frame.
//! No history is kept, so motion is smooth but never extrapolated.

use std::collections::HashMap;
use std::time::Instant;

use glam::{Quat, Vec3};

use crate::sim::arena::{Arena, Handle};
use crate::ws::protocol::{AnimationState, PlayerSnapshot, SessionId};

#[derive(Debug, Clone)]
pub struct RemoteEntity {
    pub network_id: SessionId,
    pub target_position: Vec3,
    pub target_rotation: Quat,
    /// Receipt time of the snapshot that set the target
    pub received_at: Instant,
    /// Displayed transform
    pub position: Vec3,
    pub rotation: Quat,
    pub health: f32,
    pub max_health: f32,
    pub animation: AnimationState,
}

impl RemoteEntity {
    fn from_snapshot(snapshot: &PlayerSnapshot, now: Instant) -> Self {
        Self {
            network_id: snapshot.id,
            target_position: snapshot.position,
            target_rotation: snapshot.rotation,
            received_at: now,
            position: snapshot.position,
            rotation: snapshot.rotation,
            health: snapshot.health,
            max_health: snapshot.max_health,
            animation: snapshot.animation,
        }
    }

    /// Whether the last known health is zero
    pub fn is_defeated(&self) -> bool {
        self.health <= 0.0
    }
}

/// Remote entities stored in an arena and looked up by network id
#[derive(Debug, Default)]
pub struct RemoteRegistry {
    entities: Arena<RemoteEntity>,
    by_id: HashMap<SessionId, Handle>,
}

impl RemoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn handle_of(&self, id: SessionId) -> Option<Handle> {
        self.by_id.get(&id).copied()
    }

    pub fn get(&self, handle: Handle) -> Option<&RemoteEntity> {
        self.entities.get(handle)
    }

    pub fn by_network_id(&self, id: SessionId) -> Option<&RemoteEntity> {
        self.handle_of(id).and_then(|h| self.entities.get(h))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &RemoteEntity)> {
        self.entities.iter()
    }

    /// Apply a snapshot, creating the entity on first sight.
    /// A new entity starts displayed at its target.
    pub fn upsert(&mut self, snapshot: &PlayerSnapshot, now: Instant) -> Handle {
        if let Some(handle) = self.handle_of(snapshot.id) {
            if let Some(entity) = self.entities.get_mut(handle) {
                entity.target_position = snapshot.position;
                entity.target_rotation = snapshot.rotation;
                entity.received_at = now;
                entity.health = snapshot.health;
                entity.max_health = snapshot.max_health;
                entity.animation = snapshot.animation;
                return handle;
            }
        }

        let handle = self
            .entities
            .insert(RemoteEntity::from_snapshot(snapshot, now));
        self.by_id.insert(snapshot.id, handle);
        handle
    }

    /// Snap both target and display, used for respawns
    pub fn teleport(&mut self, snapshot: &PlayerSnapshot, now: Instant) -> Handle {
        let handle = self.upsert(snapshot, now);
        if let Some(entity) = self.entities.get_mut(handle) {
            entity.position = snapshot.position;
            entity.rotation = snapshot.rotation;
        }
        handle
    }

    pub fn set_health(&mut self, id: SessionId, health: f32) {
        if let Some(entity) = self
            .handle_of(id)
            .and_then(|h| self.entities.get_mut(h))
        {
            entity.health = health;
            if health <= 0.0 {
                entity.animation = AnimationState::Dead;
            }
        }
    }

    pub fn remove(&mut self, id: SessionId) -> Option<RemoteEntity> {
        let handle = self.by_id.remove(&id)?;
        self.entities.remove(handle)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.by_id.clear();
    }

    /// Move every displayed transform `fraction` of the way to its target.
    pub fn interpolate(&mut self, fraction: f32) {
        let t = fraction.clamp(0.0, 1.0);
        for (_, entity) in self.entities.iter_mut() {
            entity.position = entity.position.lerp(entity.target_position, t);
            entity.rotation = entity.rotation.slerp(entity.target_rotation, t);
        }
    }
}
