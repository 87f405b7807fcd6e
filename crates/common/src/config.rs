use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (delivery event sink)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Transport key served by the paging daemon (default: "pager")
    pub pager_transport_key: String,

    /// TCP address of the paging appliance
    pub pager_transmitter_addr: String,

    /// Timeout for one transmission, connect through acknowledgement
    pub pager_transmit_timeout_ms: u64,

    /// Attempts after which a message is no longer selected
    pub pager_retry_limit: i32,

    /// Age after which a queued message is no longer selected
    pub pager_max_age_secs: u64,

    /// Pause after a successful send
    pub pager_send_interval_ms: u64,

    /// Pause after a failed transmission (typically longer than the send interval)
    pub pager_failure_interval_ms: u64,

    /// Pause when no message is eligible
    pub pager_idle_interval_ms: u64,

    /// Redis pub/sub channel for delivery events
    pub pager_events_channel: String,

    /// HTTP listen port of the API server
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            pager_transport_key: std::env::var("PAGER_TRANSPORT_KEY")
                .unwrap_or_else(|_| "pager".to_string()),
            pager_transmitter_addr: std::env::var("PAGER_TRANSMITTER_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:5100".to_string()),
            pager_transmit_timeout_ms: parse_var("PAGER_TRANSMIT_TIMEOUT_MS", "10000")?,
            pager_retry_limit: parse_var("PAGER_RETRY_LIMIT", "5")?,
            pager_max_age_secs: parse_var("PAGER_MAX_AGE_SECS", "3600")?,
            pager_send_interval_ms: parse_var("PAGER_SEND_INTERVAL_MS", "1000")?,
            pager_failure_interval_ms: parse_var("PAGER_FAILURE_INTERVAL_MS", "30000")?,
            pager_idle_interval_ms: parse_var("PAGER_IDLE_INTERVAL_MS", "2000")?,
            pager_events_channel: std::env::var("PAGER_EVENTS_CHANNEL")
                .unwrap_or_else(|_| "beacon:pager:events".to_string()),
            api_port: parse_var("API_PORT", "3000")?,
        })
    }

    pub fn pager_transmit_timeout(&self) -> Duration {
        Duration::from_millis(self.pager_transmit_timeout_ms)
    }

    pub fn pager_send_interval(&self) -> Duration {
        Duration::from_millis(self.pager_send_interval_ms)
    }

    pub fn pager_failure_interval(&self) -> Duration {
        Duration::from_millis(self.pager_failure_interval_ms)
    }

    pub fn pager_idle_interval(&self) -> Duration {
        Duration::from_millis(self.pager_idle_interval_ms)
    }
}

/// Read `name` from the environment, falling back to `default`, and parse it.
fn parse_var<T: FromStr>(name: &str, default: &str) -> anyhow::Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| {
            anyhow::anyhow!(
                "{name} must be a valid {}",
                std::any::type_name::<T>()
            )
        })
}
