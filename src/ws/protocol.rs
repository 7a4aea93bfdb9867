//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Server-assigned numeric session id
pub type SessionId = u32;

/// Coarse animation state mirrored to other clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnimationState {
    #[default]
    Idle,
    Walk,
    Run,
    Jump,
    Fall,
    Dead,
}

/// Body region a hit claim landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HitZone {
    Head,
    Body,
    Limb,
}

impl HitZone {
    /// Damage multiplier applied by the shooter's client
    pub fn multiplier(self) -> f32 {
        match self {
            Self::Head => 2.0,
            Self::Body => 1.0,
            Self::Limb => 0.75,
        }
    }
}

/// Full replicated state of one player
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: SessionId,
    pub position: Vec3,
    pub rotation: Quat,
    pub animation: AnimationState,
    pub health: f32,
    pub max_health: f32,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Local transform, sent at the client send rate
    PlayerUpdate {
        position: Vec3,
        rotation: Quat,
        animation: AnimationState,
        health: f32,
    },

    /// Weapon fired
    Shoot { position: Vec3, direction: Vec3 },

    /// Hit claimed by the shooter's client
    PlayerHit {
        target_id: SessionId,
        damage: f32,
        hit_zone: HitZone,
    },

    Ping,
    Pong,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// First message on a new connection
    Init {
        id: SessionId,
        state: PlayerSnapshot,
        /// Every other session at accept time
        players: Vec<PlayerSnapshot>,
    },

    PlayerJoined { player: PlayerSnapshot },

    PlayerLeft { id: SessionId },

    /// Aggregate snapshot, broadcast once per tick
    WorldState {
        tick: u64,
        timestamp: u64,
        players: Vec<PlayerSnapshot>,
    },

    PlayerShoot {
        shooter_id: SessionId,
        position: Vec3,
        direction: Vec3,
    },

    /// Sent to the victim of a hit
    PlayerDamaged {
        source_id: SessionId,
        damage: f32,
        hit_zone: HitZone,
        health: f32,
    },

    /// Sent to the shooter of a hit
    HitConfirmed { target_id: SessionId, health: f32 },

    HealthUpdate { player_id: SessionId, health: f32 },

    PlayerDefeated {
        player_id: SessionId,
        killer_id: SessionId,
    },

    /// Sent to the respawned player
    Respawn { state: PlayerSnapshot },

    /// Sent to everyone else
    PlayerRespawned { player: PlayerSnapshot },

    Ping,
    Pong,
}

/// Decoding failure for an inbound frame
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ClientMsg {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ServerMsg {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
