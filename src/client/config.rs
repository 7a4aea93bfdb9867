//! Client configuration

use std::env;
use std::time::Duration;

use crate::config::ConfigError;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:8080/ws`
    pub server_url: String,

    /// Backoff before the first reconnect attempt
    pub reconnect_base: Duration,
    /// Backoff ceiling
    pub reconnect_cap: Duration,
    /// Attempts after which the client stays disconnected
    pub max_reconnect_attempts: u32,

    /// Interval between two `playerUpdate` sends
    pub send_interval: Duration,
    /// Fraction of the remaining distance remote entities cover per frame
    pub interpolation_fraction: f32,

    pub projectile_speed: f32,
    /// Projectile lifetime in seconds
    pub projectile_ttl: f32,
    /// Damage of a body hit before the zone multiplier
    pub base_damage: f32,
    /// Radius of a remote player's hit sphere
    pub hit_radius: f32,
    /// Height of a remote player's hit capsule above its feet
    pub player_height: f32,
    /// Muzzle height above the local player's feet
    pub eye_height: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080/ws".to_string(),
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            send_interval: Duration::from_millis(50),
            interpolation_fraction: 0.2,
            projectile_speed: 80.0,
            projectile_ttl: 2.0,
            base_damage: 25.0,
            hit_radius: 0.5,
            player_height: 1.8,
            eye_height: 1.6,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `SERVER_URL` and `MAX_RECONNECT_ATTEMPTS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(url) = env::var("SERVER_URL") {
            config.server_url = url;
        }
        if let Ok(raw) = env::var("MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("MAX_RECONNECT_ATTEMPTS"))?;
        }
        Ok(config)
    }
}
