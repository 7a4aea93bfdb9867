//! Server-side game state: session store, tick loop, combat

pub mod combat;
pub mod session;
pub mod snapshot;
pub mod spawn;
pub mod world;

pub use combat::{CombatSystem, HitClaim, HitOutcome, HitRejected};
pub use session::{Outbound, PlayerState, ReportedState, Session, UpdateRejected};
pub use world::{DisconnectReason, World, WorldClosed, WorldEvent, WorldHandle};
