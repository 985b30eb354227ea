//! Application configuration
//!
//! Loaded from an optional YAML file with per-field defaults; values
//! that vary per deployment (`DATABASE_URL`, `PORT`) may be overridden
//! from the environment. Defaults carry the contract constants: 600 s
//! lock TTL and booking expiry, 60 s sweep cadence, 5 s gateway
//! deadline, 5 publish retries, DLQ after 10 delivery attempts.

use std::time::Duration;

use serde::Deserialize;

/// Complete application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AppConfig {
    /// HTTP gateway port
    pub port: u16,

    /// Seat lock TTL in seconds
    pub lock_ttl_secs: u64,
    /// PENDING booking lifetime in seconds
    pub booking_expiry_secs: u64,
    /// Expiry sweeper cadence in seconds
    pub expiry_sweep_interval_secs: u64,
    /// Payment sweeper cadence in seconds
    pub payment_sweep_interval_secs: u64,

    /// Payment gateway deadline in seconds
    pub gateway_timeout_secs: u64,
    /// Publish retry budget (exponential backoff)
    pub bus_publish_retries: u32,
    /// Delivery attempts before a message is dead-lettered
    pub consumer_dlq_after: u32,
    /// Bus partitions per (topic, group)
    pub bus_partitions: usize,

    /// PostgreSQL connection string; memory stores when absent
    pub database_url: Option<String>,
    /// Real payment processor base URL; mock gateway when absent
    pub payment_gateway_url: Option<String>,
    /// Mock gateway approval probability
    pub mock_success_rate: f64,
    /// Mock gateway base latency in milliseconds
    pub mock_latency_ms: u64,

    // Logging
    pub log_dir: String,
    pub log_file: String,
    pub log_level: String,
    /// "hourly", "daily" or "never"
    pub rotation: String,
    pub use_json: bool,
    pub enable_tracing: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            lock_ttl_secs: 600,
            booking_expiry_secs: 600,
            expiry_sweep_interval_secs: 60,
            payment_sweep_interval_secs: 60,
            gateway_timeout_secs: 5,
            bus_publish_retries: 5,
            consumer_dlq_after: 10,
            bus_partitions: 16,
            database_url: None,
            payment_gateway_url: None,
            mock_success_rate: 0.9,
            mock_latency_ms: 1500,
            log_dir: "logs".to_string(),
            log_file: "boxoffice.log".to_string(),
            log_level: "info".to_string(),
            rotation: "daily".to_string(),
            use_json: false,
            enable_tracing: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional YAML file, then apply
    /// environment overrides.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)?;
                serde_yaml::from_str(&raw)?
            }
            None => Self::default(),
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = Some(url);
        }
        if let Ok(port) = std::env::var("PORT") {
            config.port = port.parse()?;
        }

        Ok(config)
    }

    #[inline]
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    #[inline]
    pub fn booking_expiry(&self) -> Duration {
        Duration::from_secs(self.booking_expiry_secs)
    }

    #[inline]
    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }

    #[inline]
    pub fn payment_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.payment_sweep_interval_secs)
    }

    #[inline]
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    #[inline]
    pub fn mock_latency(&self) -> Duration {
        Duration::from_millis(self.mock_latency_ms)
    }
}
