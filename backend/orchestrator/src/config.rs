//! Application configuration loaded from environment variables.

use crate::errors::{OrchestratorError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC endpoint of the chain node
    pub rpc_url: String,
    /// The campaign factory contract address
    pub factory_address: String,
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) the status reconciler re-evaluates campaigns
    pub poll_interval_secs: u64,
    /// Attempt budget for a single chain read
    pub read_attempts: u32,
    /// Base backoff between read attempts (linear: base × attempt)
    pub retry_backoff_ms: u64,
    /// Overall wall-clock budget for one read sequence
    pub read_timeout_secs: u64,
    /// Cool-down after which a stale in-flight guard may be reclaimed
    pub guard_cooldown_ms: u64,
    /// Interval between transaction-receipt polls
    pub confirm_poll_ms: u64,
    /// Maximum number of receipt polls before giving up
    pub confirm_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            rpc_url: env_var("RPC_URL").unwrap_or_else(|_| "http://localhost:8545".to_string()),
            factory_address: env_var("FACTORY_ADDRESS").map_err(|_| {
                OrchestratorError::Config(
                    "FACTORY_ADDRESS environment variable is required".to_string(),
                )
            })?,
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./campaigns.db".to_string()),
            api_port: parse_var("API_PORT", "3001")?,
            poll_interval_secs: parse_var("POLL_INTERVAL_SECS", "30")?,
            read_attempts: parse_var("READ_ATTEMPTS", "3")?,
            retry_backoff_ms: parse_var("RETRY_BACKOFF_MS", "500")?,
            read_timeout_secs: parse_var("READ_TIMEOUT_SECS", "30")?,
            guard_cooldown_ms: parse_var("GUARD_COOLDOWN_MS", "1500")?,
            confirm_poll_ms: parse_var("CONFIRM_POLL_MS", "2000")?,
            confirm_attempts: parse_var("CONFIRM_ATTEMPTS", "60")?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| OrchestratorError::Config(format!("Missing env var: {key}")))
}

fn parse_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| OrchestratorError::Config(format!("Invalid {key}")))
}
