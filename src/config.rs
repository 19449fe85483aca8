//! Application configuration loaded from environment variables.
//!
//! Secrets (signing keys) are read once at startup and kept in memory for
//! the life of the process.

use std::env;

/// Points credited per successful scan. Policy value, never derived from
/// the scanned token.
pub const DEFAULT_AWARD_POINTS: u64 = 3;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Snapshot file for the reward store (None = in-memory only)
    pub data_path: Option<String>,
    /// Points awarded per successful scan
    pub award_points: u64,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for identity assertions from the auth frontend
    pub identity_assertion_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            data_path: env::var("REWARDS_DATA_PATH").ok(),
            award_points: env::var("AWARD_POINTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_AWARD_POINTS),

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            identity_assertion_key: env::var("IDENTITY_ASSERTION_KEY")
                .map_err(|_| ConfigError::Missing("IDENTITY_ASSERTION_KEY"))?
                .into_bytes(),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            data_path: None,
            award_points: DEFAULT_AWARD_POINTS,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            identity_assertion_key: b"test_assertion_key".to_vec(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("IDENTITY_ASSERTION_KEY", "test_assertion_key");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.port, 8080);
        assert_eq!(
            config.jwt_signing_key,
            b"test_jwt_key_32_bytes_minimum!!".to_vec()
        );
    }

    #[test]
    fn test_test_default_award() {
        let config = Config::test_default();
        assert_eq!(config.award_points, DEFAULT_AWARD_POINTS);
        assert!(config.data_path.is_none());
    }
}
