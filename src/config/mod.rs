//! Configuration module for the storefront backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default upstream endpoint for the Pressmaster quoting service.
pub const DEFAULT_PRESSMASTER_URL: &str = "https://api.pressmaster.com/v1/quotes";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Pressmaster credential; presence selects live mode, absence stub mode
    pub pressmaster_api_key: Option<String>,
    /// Upstream quoting endpoint
    pub pressmaster_url: String,
    /// Upper bound on the upstream quote call
    pub quote_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("PPP_API_PSK").ok();

        let db_path = env::var("PPP_DB_PATH")
            .unwrap_or_else(|_| "./data/app.sqlite".to_string())
            .into();

        let bind_addr = env::var("PPP_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid PPP_BIND_ADDR format");

        let log_level = env::var("PPP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let pressmaster_api_key = env::var("PRESSMASTER_API_KEY").ok();

        let pressmaster_url =
            env::var("PRESSMASTER_URL").unwrap_or_else(|_| DEFAULT_PRESSMASTER_URL.to_string());

        let quote_timeout = env::var("PPP_QUOTE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            pressmaster_api_key,
            pressmaster_url,
            quote_timeout,
        }
    }
}
