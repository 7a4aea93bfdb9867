//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{World, WorldHandle};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub world: WorldHandle,
}

impl AppState {
    /// Build the state and the world task it talks to. The caller spawns
    /// `World::run`.
    pub fn new(config: Config) -> (Self, World) {
        let config = Arc::new(config);
        let (world, handle) = World::new(config.clone());

        let state = Self {
            config,
            world: handle,
        };
        (state, world)
    }
}
