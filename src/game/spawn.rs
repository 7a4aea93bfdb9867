//! Spawn point selection

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Draws spawn points uniformly from a horizontal disc
pub struct SpawnPlanner {
    rng: ChaCha8Rng,
    radius: f32,
    height: f32,
}

impl SpawnPlanner {
    pub fn new(seed: u64, radius: f32, height: f32) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            radius: radius.max(0.0),
            height,
        }
    }

    /// Seed from entropy when no seed is configured
    pub fn from_optional_seed(seed: Option<u64>, radius: f32, height: f32) -> Self {
        let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
        Self::new(seed, radius, height)
    }

    /// Generate a spawn position
    pub fn next_position(&mut self) -> Vec3 {
        if self.radius <= 0.0 {
            return Vec3::new(0.0, self.height, 0.0);
        }
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        // sqrt keeps the density uniform over the disc area
        let distance = self.radius * self.rng.gen_range(0.0f32..1.0).sqrt();
        Vec3::new(angle.cos() * distance, self.height, angle.sin() * distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_stay_inside_disc() {
        let mut planner = SpawnPlanner::new(7, 20.0, 1.0);
        for _ in 0..500 {
            let p = planner.next_position();
            assert!(Vec3::new(p.x, 0.0, p.z).length() <= 20.0 + 1e-4);
            assert_eq!(p.y, 1.0);
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SpawnPlanner::new(42, 10.0, 0.0);
        let mut b = SpawnPlanner::new(42, 10.0, 0.0);
        for _ in 0..10 {
            assert_eq!(a.next_position(), b.next_position());
        }
    }

    #[test]
    fn consecutive_spawns_differ() {
        let mut planner = SpawnPlanner::new(3, 10.0, 0.0);
        assert_ne!(planner.next_position(), planner.next_position());
    }
}
