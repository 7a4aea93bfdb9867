//! Combat system - hit claims, damage, defeat

use crate::ws::protocol::{HitZone, SessionId};

/// Hit reported by the shooter's client
///
/// The server applies the claimed damage as-is: there is no trajectory or
/// timing check against the shooter's last validated position.
#[derive(Debug, Clone, Copy)]
pub struct HitClaim {
    pub shooter_id: SessionId,
    pub target_id: SessionId,
    pub damage: f32,
    pub hit_zone: HitZone,
}

/// Result of applying a hit claim
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitOutcome {
    pub shooter_id: SessionId,
    pub target_id: SessionId,
    pub damage: f32,
    pub hit_zone: HitZone,
    pub health: f32,
    pub defeated: bool,
}

/// Why a hit claim was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HitRejected {
    #[error("shooter session {0} does not exist")]
    UnknownShooter(SessionId),
    #[error("target session {0} does not exist")]
    UnknownTarget(SessionId),
    #[error("player {0} claimed a hit on itself")]
    SelfHit(SessionId),
    #[error("target {0} is already defeated")]
    TargetDefeated(SessionId),
    #[error("damage is not a finite non-negative number")]
    InvalidDamage,
}

/// Combat system for managing damage
pub struct CombatSystem;

impl CombatSystem {
    /// Apply damage to health, returns (new_health, is_defeated)
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        let new_health = (current_health - damage).max(0.0);
        (new_health, new_health <= 0.0)
    }

    /// Check a claim's own fields before any session lookup
    pub fn check_claim(claim: &HitClaim) -> Result<(), HitRejected> {
        if !claim.damage.is_finite() || claim.damage < 0.0 {
            return Err(HitRejected::InvalidDamage);
        }
        if claim.shooter_id == claim.target_id {
            return Err(HitRejected::SelfHit(claim.shooter_id));
        }
        Ok(())
    }
}
