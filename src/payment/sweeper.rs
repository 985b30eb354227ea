//! Payment sweeper
//!
//! Background worker that resolves transactions stuck in PENDING after a
//! gateway timeout or an engine crash. The gateway is queried by
//! idempotency key: a recorded outcome is applied as if the original
//! charge had answered; a charge the processor never saw is failed
//! closed once it is old enough (the money never moved).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::engine::PaymentEngine;
use super::error::PaymentError;
use super::gateway::{ChargeOutcome, PaymentGateway};
use super::store::TransactionStore;
use super::types::{Transaction, TransactionStatus};

/// Configuration for the payment sweeper
#[derive(Debug, Clone)]
pub struct PaymentSweeperConfig {
    /// How often to scan for stuck transactions
    pub scan_interval: Duration,
    /// How long a transaction must sit in PENDING to be considered stuck
    pub stale_threshold: Duration,
    /// Age past which an unknown charge is failed closed
    pub abandon_after: Duration,
    /// Maximum transactions to process per scan
    pub batch_size: usize,
}

impl Default for PaymentSweeperConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(60),
            stale_threshold: Duration::from_secs(60),
            abandon_after: Duration::from_secs(300),
            batch_size: 100,
        }
    }
}

/// Stuck-transaction resolver
pub struct PaymentSweeper {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    engine: Arc<PaymentEngine>,
    config: PaymentSweeperConfig,
}

impl PaymentSweeper {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        engine: Arc<PaymentEngine>,
        config: PaymentSweeperConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            engine,
            config,
        }
    }

    /// Run the sweeper loop forever.
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            stale_threshold_secs = self.config.stale_threshold.as_secs(),
            "Starting payment sweeper"
        );

        loop {
            if let Err(e) = self.sweep_once().await {
                error!(error = %e, "Payment sweep failed");
            }
            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single scan. Returns how many transactions were resolved.
    pub async fn sweep_once(&self) -> Result<usize, PaymentError> {
        let stale = self
            .store
            .find_stale_pending(self.config.stale_threshold, self.config.batch_size)
            .await?;

        if stale.is_empty() {
            debug!("No stuck transactions found");
            return Ok(0);
        }

        info!(count = stale.len(), "Found stuck transactions to resolve");

        let mut resolved = 0;
        for txn in stale {
            match self.resolve_one(&txn).await {
                Ok(true) => resolved += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(
                        transaction_id = %txn.transaction_id,
                        error = %e,
                        "Failed to resolve stuck transaction"
                    );
                }
            }
        }

        if resolved > 0 {
            info!(count = resolved, "Resolved stuck transactions this sweep");
        }
        Ok(resolved)
    }

    async fn resolve_one(&self, txn: &Transaction) -> Result<bool, PaymentError> {
        let outcome = match self.gateway.lookup(&txn.idempotency_key).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    transaction_id = %txn.transaction_id,
                    error = %e,
                    "Gateway lookup failed (will retry next sweep)"
                );
                return Ok(false);
            }
        };

        let transitioned = match outcome {
            Some(ChargeOutcome::Approved { reference }) => {
                info!(
                    transaction_id = %txn.transaction_id,
                    booking_id = txn.booking_id,
                    "Stuck charge actually succeeded at the gateway"
                );
                self.store.mark_success(txn.transaction_id, &reference).await?
            }
            Some(ChargeOutcome::Declined { reason }) => {
                self.store.mark_failed(txn.transaction_id, &reason).await?
            }
            None => {
                let age = (Utc::now() - txn.created_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if age < self.config.abandon_after {
                    // Charge may still be in flight somewhere; wait.
                    return Ok(false);
                }
                warn!(
                    transaction_id = %txn.transaction_id,
                    booking_id = txn.booking_id,
                    age_secs = age.as_secs(),
                    "Charge never reached the gateway; failing closed"
                );
                self.store
                    .mark_failed(txn.transaction_id, "Gateway timeout")
                    .await?
            }
        };

        if !transitioned {
            // Someone else resolved it meanwhile.
            return Ok(false);
        }

        let updated = self
            .store
            .get(txn.transaction_id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(txn.transaction_id.to_string()))?;
        debug_assert!(updated.status != TransactionStatus::Pending);
        self.engine.publish_result(&updated).await;
        Ok(true)
    }
}
