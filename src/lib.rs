//! Skirmish - authoritative real-time multiplayer synchronization
//!
//! The server side keeps the canonical state of every connected player,
//! applies inbound updates and hit claims, and broadcasts a snapshot every
//! tick. The client side predicts the local player with a fixed-timestep
//! movement controller, manages the connection lifecycle, and smooths
//! remote players toward the latest snapshot.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod sim;
pub mod util;
pub mod ws;
