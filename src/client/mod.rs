//! Client-side synchronization: connection lifecycle, remote interpolation
//! and the per-frame driver tying them to the local simulation

pub mod app;
pub mod config;
pub mod connection;
pub mod remote;
pub mod transport;

pub use app::{ClientApp, FrameInput, FrameReport};
pub use config::ClientConfig;
pub use connection::{backoff_delay, ConnectionManager, ConnectionState};
pub use remote::{RemoteEntity, RemoteRegistry};
pub use transport::{Transport, TransportError, TransportEvent, WsTransport};
