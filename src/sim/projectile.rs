//! Ephemeral projectiles
//!
//! A projectile leaves the set exactly once: either its time-to-live runs
//! out or a collision flagged it for deletion. Both paths go through
//! [`Arena::remove`], which hands a value back at most once.

use glam::Vec3;

use crate::sim::arena::{Arena, Handle};
use crate::ws::protocol::SessionId;

#[derive(Debug, Clone)]
pub struct Projectile {
    pub owner_id: SessionId,
    pub spawn_position: Vec3,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Seconds left before expiry
    pub ttl: f32,
    /// Set by collision handling; removal happens on the next advance
    pub hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    Expired,
    Hit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Removed {
    pub handle: Handle,
    pub owner_id: SessionId,
    pub cause: RemovalCause,
}

#[derive(Debug, Default)]
pub struct ProjectileSet {
    arena: Arena<Projectile>,
}

impl ProjectileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn spawn(
        &mut self,
        owner_id: SessionId,
        position: Vec3,
        direction: Vec3,
        speed: f32,
        ttl: f32,
    ) -> Handle {
        self.arena.insert(Projectile {
            owner_id,
            spawn_position: position,
            position,
            velocity: direction.normalize_or_zero() * speed,
            ttl,
            hit: false,
        })
    }

    pub fn get(&self, handle: Handle) -> Option<&Projectile> {
        self.arena.get(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Projectile)> {
        self.arena.iter()
    }

    /// Flag a projectile for collision removal. Returns false if the handle
    /// is stale or the projectile was already flagged.
    pub fn mark_hit(&mut self, handle: Handle) -> bool {
        match self.arena.get_mut(handle) {
            Some(projectile) if !projectile.hit => {
                projectile.hit = true;
                true
            }
            _ => false,
        }
    }

    /// Remove flagged and expired projectiles, then move the survivors.
    pub fn advance(&mut self, dt: f32) -> Vec<Removed> {
        let mut doomed = Vec::new();
        for (handle, projectile) in self.arena.iter_mut() {
            if projectile.hit {
                doomed.push((handle, RemovalCause::Hit));
                continue;
            }
            projectile.ttl -= dt;
            if projectile.ttl <= 0.0 {
                doomed.push((handle, RemovalCause::Expired));
                continue;
            }
            projectile.position += projectile.velocity * dt;
        }

        doomed
            .into_iter()
            .filter_map(|(handle, cause)| {
                self.arena.remove(handle).map(|projectile| Removed {
                    handle,
                    owner_id: projectile.owner_id,
                    cause,
                })
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.arena.clear();
    }
}
