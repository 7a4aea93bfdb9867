//! Authoritative per-session player state and inbound validation

use glam::{Quat, Vec3};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::ws::protocol::{AnimationState, PlayerSnapshot, SessionId};

/// Frame queued for a session's socket writer
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Pre-serialized JSON message
    Text(std::sync::Arc<str>),
    /// Transport-level keepalive ping
    Ping,
    /// Close the socket
    Close,
}

/// Player state in the world (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: SessionId,
    pub position: Vec3,
    pub rotation: Quat,
    pub animation: AnimationState,
    pub health: f32,
    pub max_health: f32,
}

impl PlayerState {
    pub fn spawned(id: SessionId, position: Vec3, max_health: f32) -> Self {
        Self {
            id,
            position,
            rotation: Quat::IDENTITY,
            animation: AnimationState::Idle,
            health: max_health,
            max_health,
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            position: self.position,
            rotation: self.rotation,
            animation: self.animation,
            health: self.health,
            max_health: self.max_health,
        }
    }

    pub fn is_defeated(&self) -> bool {
        self.health <= 0.0
    }

    /// Validate and apply a client-reported transform.
    ///
    /// Nothing is written unless every field passes. Reported health is
    /// checked but never stored: only hits and respawns change it. While
    /// `defeated` the animation is pinned to `Dead`.
    pub fn apply_update(&mut self, update: &ReportedState, defeated: bool) -> Result<(), UpdateRejected> {
        let rotation = update.validate(self.max_health)?;

        self.position = update.position;
        self.rotation = rotation;
        self.animation = if defeated {
            AnimationState::Dead
        } else {
            update.animation
        };
        Ok(())
    }
}

/// Client-reported fields of a `playerUpdate`
#[derive(Debug, Clone, Copy)]
pub struct ReportedState {
    pub position: Vec3,
    pub rotation: Quat,
    pub animation: AnimationState,
    pub health: f32,
}

impl ReportedState {
    /// Check every field; returns the normalized rotation on success.
    pub fn validate(&self, max_health: f32) -> Result<Quat, UpdateRejected> {
        if !self.position.is_finite() {
            return Err(UpdateRejected::NonFinitePosition);
        }
        if !self.rotation.is_finite() {
            return Err(UpdateRejected::NonFiniteRotation);
        }
        if self.rotation.length_squared() < 1e-6 {
            return Err(UpdateRejected::DegenerateRotation);
        }
        if !self.health.is_finite() {
            return Err(UpdateRejected::NonFiniteHealth);
        }
        if self.health < 0.0 {
            return Err(UpdateRejected::NegativeHealth);
        }
        if self.health > max_health {
            return Err(UpdateRejected::HealthAboveMax);
        }
        Ok(self.rotation.normalize())
    }
}

/// Validate a `shoot` payload
pub fn validate_shot(position: Vec3, direction: Vec3) -> Result<Vec3, UpdateRejected> {
    if !position.is_finite() {
        return Err(UpdateRejected::NonFinitePosition);
    }
    if !direction.is_finite() || direction.length_squared() < 1e-6 {
        return Err(UpdateRejected::InvalidDirection);
    }
    Ok(direction.normalize())
}

/// Why an inbound state report was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UpdateRejected {
    #[error("position is not finite")]
    NonFinitePosition,
    #[error("rotation is not finite")]
    NonFiniteRotation,
    #[error("rotation has zero length")]
    DegenerateRotation,
    #[error("health is not finite")]
    NonFiniteHealth,
    #[error("health is negative")]
    NegativeHealth,
    #[error("health exceeds max health")]
    HealthAboveMax,
    #[error("direction is not a finite non-zero vector")]
    InvalidDirection,
}

/// A connected session
#[derive(Debug)]
pub struct Session {
    pub state: PlayerState,
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub last_activity: Instant,
    /// Last keepalive ping sent, cleared by inbound activity
    pub last_ping: Option<Instant>,
    /// Pending respawn; dropping the session drops the timer with it
    pub respawn_at: Option<Instant>,
}

impl Session {
    pub fn new(state: PlayerState, outbound: mpsc::UnboundedSender<Outbound>, now: Instant) -> Self {
        Self {
            state,
            outbound,
            last_activity: now,
            last_ping: None,
            respawn_at: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.state.id
    }

    /// Fire-and-forget send; a closed writer is cleaned up by the disconnect path.
    pub fn send(&self, frame: Outbound) {
        let _ = self.outbound.send(frame);
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
        self.last_ping = None;
    }

    pub fn awaiting_respawn(&self) -> bool {
        self.respawn_at.is_some()
    }
}
