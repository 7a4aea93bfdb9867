//! Simulation building blocks shared by client and headless tools

pub mod arena;
pub mod movement;
pub mod projectile;
pub mod timestep;

pub use arena::{Arena, Handle};
pub use movement::{
    CollisionResolver, GroundPlane, LocalController, LocalControllerState, MoveState,
    MovementConfig, MovementInput, SweepResult,
};
pub use projectile::{Projectile, ProjectileSet, RemovalCause};
pub use timestep::{FixedTimestep, StepPlan, TimestepConfig};
