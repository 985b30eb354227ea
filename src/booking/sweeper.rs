//! Expiry sweeper
//!
//! Background worker that expires PENDING bookings whose deadline has
//! passed and returns their seats to the pool. Safe to run concurrently
//! with the payment-result consumers: the per-booking status CAS inside
//! the saga decides every race.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use super::error::BookingError;
use super::saga::BookingSaga;

/// Configuration for the expiry sweeper
#[derive(Debug, Clone)]
pub struct ExpirySweeperConfig {
    /// How often to scan for overdue bookings
    pub scan_interval: Duration,
    /// Maximum bookings to expire per scan
    pub batch_size: usize,
}

impl Default for ExpirySweeperConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

/// Overdue-booking reaper
pub struct ExpirySweeper {
    saga: Arc<BookingSaga>,
    config: ExpirySweeperConfig,
}

impl ExpirySweeper {
    pub fn new(saga: Arc<BookingSaga>, config: ExpirySweeperConfig) -> Self {
        Self { saga, config }
    }

    pub fn with_defaults(saga: Arc<BookingSaga>) -> Self {
        Self::new(saga, ExpirySweeperConfig::default())
    }

    /// Run the sweeper loop forever.
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting expiry sweeper"
        );

        loop {
            match self.sweep_once().await {
                Ok(0) => debug!("No overdue bookings"),
                Ok(count) => info!(count, "Expired overdue bookings"),
                Err(e) => error!(error = %e, "Expiry sweep failed"),
            }
            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single sweep cycle. Returns how many bookings were expired.
    pub async fn sweep_once(&self) -> Result<usize, BookingError> {
        self.saga.expire_due(self.config.batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweeper_config_default() {
        let config = ExpirySweeperConfig::default();
        assert_eq!(config.scan_interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 100);
    }
}
