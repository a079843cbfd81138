//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Account service base URL. Empty disables the store: guests only,
    /// no coin persistence.
    pub accounts_url: String,
    /// Account service API key
    pub accounts_api_key: String,

    /// Allowed client origin for CORS (comma-separated for multiple)
    pub client_origin: String,

    /// Match RNG seed override, for reproducible arenas in staging
    pub match_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let accounts_url = env::var("ACCOUNTS_API_URL").unwrap_or_default();
        let accounts_api_key = if accounts_url.is_empty() {
            String::new()
        } else {
            env::var("ACCOUNTS_API_KEY").map_err(|_| ConfigError::Missing("ACCOUNTS_API_KEY"))?
        };

        let match_seed = match env::var("MATCH_SEED") {
            Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::InvalidSeed)?),
            Err(_) => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            accounts_url,
            accounts_api_key,

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            match_seed,
        })
    }

    pub fn accounts_enabled(&self) -> bool {
        !self.accounts_url.is_empty()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("MATCH_SEED must be an unsigned integer")]
    InvalidSeed,
}
