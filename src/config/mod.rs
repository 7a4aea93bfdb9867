//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// worldState broadcasts per second
    pub tick_rate_hz: u32,
    /// Period of the keepalive sweep
    pub ping_interval: Duration,
    /// Inbound silence after which a session gets a keepalive ping
    pub idle_ping_after: Duration,
    /// Inbound silence after which a session is closed
    pub idle_timeout: Duration,
    /// Period of the idle reaper
    pub idle_check_interval: Duration,
    /// Delay between defeat and respawn
    pub respawn_delay: Duration,

    pub max_health: f32,
    /// Radius of the disc spawn points are drawn from
    pub spawn_radius: f32,
    pub spawn_height: f32,
    /// Fixed seed for the spawn RNG; random when unset
    pub spawn_seed: Option<u64>,

    /// Max inbound frames per second per session
    pub inbound_rate_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            tick_rate_hz: 60,
            ping_interval: Duration::from_secs(5),
            idle_ping_after: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            idle_check_interval: Duration::from_secs(5),
            respawn_delay: Duration::from_secs(3),
            max_health: 100.0,
            spawn_radius: 20.0,
            spawn_height: 1.0,
            spawn_seed: None,
            inbound_rate_limit: 120,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| defaults.server_addr.to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),

            tick_rate_hz: parse_or("TICK_RATE_HZ", defaults.tick_rate_hz)?,
            ping_interval: millis_or("PING_INTERVAL_MS", defaults.ping_interval)?,
            idle_ping_after: millis_or("IDLE_PING_AFTER_MS", defaults.idle_ping_after)?,
            idle_timeout: millis_or("IDLE_TIMEOUT_MS", defaults.idle_timeout)?,
            idle_check_interval: millis_or("IDLE_CHECK_INTERVAL_MS", defaults.idle_check_interval)?,
            respawn_delay: millis_or("RESPAWN_DELAY_MS", defaults.respawn_delay)?,

            max_health: parse_or("MAX_HEALTH", defaults.max_health)?,
            spawn_radius: parse_or("SPAWN_RADIUS", defaults.spawn_radius)?,
            spawn_height: parse_or("SPAWN_HEIGHT", defaults.spawn_height)?,
            spawn_seed: match env::var("SPAWN_SEED") {
                Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid("SPAWN_SEED"))?),
                Err(_) => None,
            },

            inbound_rate_limit: parse_or("INBOUND_RATE_LIMIT", defaults.inbound_rate_limit)?,
        }
        .validated()?)
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("TICK_RATE_HZ"));
        }
        // Both feed tokio::time::interval, which panics on a zero period.
        if self.ping_interval.is_zero() {
            return Err(ConfigError::Invalid("PING_INTERVAL_MS"));
        }
        if self.idle_check_interval.is_zero() {
            return Err(ConfigError::Invalid("IDLE_CHECK_INTERVAL_MS"));
        }
        if !(self.max_health.is_finite() && self.max_health > 0.0) {
            return Err(ConfigError::Invalid("MAX_HEALTH"));
        }
        if self.idle_ping_after >= self.idle_timeout {
            return Err(ConfigError::Invalid("IDLE_PING_AFTER_MS"));
        }
        Ok(self)
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

fn millis_or(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let config = Config::default();
        assert_eq!(config.tick_rate_hz, 60);
        assert_eq!(config.idle_ping_after, Duration::from_secs(10));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.respawn_delay, Duration::from_secs(3));
        assert!(config.clone().validated().is_ok());
    }

    #[test]
    fn ping_threshold_must_be_below_timeout() {
        let config = Config {
            idle_ping_after: Duration::from_secs(40),
            ..Config::default()
        };
        assert!(matches!(
            config.validated(),
            Err(ConfigError::Invalid("IDLE_PING_AFTER_MS"))
        ));
    }

    #[test]
    fn zero_timer_periods_are_rejected() {
        let config = Config {
            ping_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(
            config.validated(),
            Err(ConfigError::Invalid("PING_INTERVAL_MS"))
        ));

        let config = Config {
            idle_check_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(
            config.validated(),
            Err(ConfigError::Invalid("IDLE_CHECK_INTERVAL_MS"))
        ));

        let config = Config {
            tick_rate_hz: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validated(),
            Err(ConfigError::Invalid("TICK_RATE_HZ"))
        ));
    }
}
