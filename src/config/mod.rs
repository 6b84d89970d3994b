//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::zone::ZoneConfig;

/// Default arena edge in tiles
pub const DEFAULT_GRID_SIZE: i32 = 31;
/// Smallest arena that still fits sixteen spawn pockets
pub const MIN_GRID_SIZE: i32 = 9;
pub const DEFAULT_SOFT_BLOCK_TARGET: u32 = 220;

/// Arena and zone tuning for new matches
#[derive(Clone, Debug)]
pub struct MatchSettings {
    pub grid_width: i32,
    pub grid_height: i32,
    pub soft_block_target: u32,
    pub zone: ZoneConfig,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            grid_width: DEFAULT_GRID_SIZE,
            grid_height: DEFAULT_GRID_SIZE,
            soft_block_target: DEFAULT_SOFT_BLOCK_TARGET,
            zone: ZoneConfig::default(),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Supabase JWT secret for token verification
    pub supabase_jwt_secret: String,
    /// Supabase project URL; with the service role key, enables the remote economy
    pub supabase_url: Option<String>,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: Option<String>,

    /// Public base URL handed to clients for the WebSocket
    pub public_base_url: String,
    /// Allowed client origin for CORS
    pub client_origin: String,

    pub match_settings: MatchSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = MatchSettings::default();
        let zone_defaults = defaults.zone.clone();
        let match_settings = MatchSettings {
            grid_width: parse_or("GRID_WIDTH", defaults.grid_width)?.max(MIN_GRID_SIZE),
            grid_height: parse_or("GRID_HEIGHT", defaults.grid_height)?.max(MIN_GRID_SIZE),
            soft_block_target: parse_or("SOFT_BLOCK_TARGET", defaults.soft_block_target)?,
            zone: ZoneConfig {
                enabled: parse_or("ZONE_ENABLED", zone_defaults.enabled)?,
                initial_delay_ms: parse_or("ZONE_INITIAL_DELAY_MS", zone_defaults.initial_delay_ms)?,
                shrink_interval_ms: parse_or(
                    "ZONE_SHRINK_INTERVAL_MS",
                    zone_defaults.shrink_interval_ms,
                )?,
            },
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .map_err(|_| ConfigError::Missing("SUPABASE_JWT_SECRET"))?,
            supabase_url: env::var("SUPABASE_URL").ok().filter(|v| !v.is_empty()),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .ok()
                .filter(|v| !v.is_empty()),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),

            match_settings,
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_uses_default_when_unset() {
        let value: u32 = parse_or("BOMB_ROYALE_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        env::set_var("BOMB_ROYALE_TEST_BAD_VAR", "not-a-number");
        let err = parse_or::<u64>("BOMB_ROYALE_TEST_BAD_VAR", 1).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("BOMB_ROYALE_TEST_BAD_VAR")));
    }

    #[test]
    fn test_default_settings_match_classic_arena() {
        let settings = MatchSettings::default();
        assert_eq!(settings.grid_width, 31);
        assert_eq!(settings.grid_height, 31);
        assert!(settings.zone.enabled);
    }
}
