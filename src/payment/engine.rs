//! Payment processing engine
//!
//! Consumes `booking.created`, charges idempotently, emits
//! `payment.success` / `payment.failed`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::error::PaymentError;
use super::gateway::{ChargeOutcome, ChargeRequest, GatewayError, PaymentGateway};
use super::store::{InsertOutcome, TransactionStore};
use super::types::{Transaction, TransactionStatus, idempotency_key};
use crate::bus::{ConsumeError, Envelope, EventHandler, RetryingPublisher};
use crate::core_types::{BookingId, UserId};
use crate::events::{BookingCreated, PaymentFailed, PaymentSuccess, Topic};

/// Default gateway deadline.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(5);

/// Idempotent charge processor
pub struct PaymentEngine {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    publisher: RetryingPublisher,
    gateway_timeout: Duration,
    currency: String,
}

impl PaymentEngine {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        publisher: RetryingPublisher,
    ) -> Self {
        Self::with_timeout(store, gateway, publisher, DEFAULT_GATEWAY_TIMEOUT)
    }

    pub fn with_timeout(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        publisher: RetryingPublisher,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            publisher,
            gateway_timeout,
            currency: "INR".to_string(),
        }
    }

    /// Process one charge with exactly-once semantics.
    ///
    /// Safe under duplicate delivery: an existing row for the
    /// idempotency key short-circuits before the gateway is touched.
    /// A gateway timeout leaves the row PENDING and returns
    /// [`PaymentError::GatewayTimeout`]; the sweeper resolves it later.
    pub async fn process(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<Transaction, PaymentError> {
        let key = idempotency_key(booking_id, user_id);

        if let Some(existing) = self.store.find_by_idempotency_key(&key).await? {
            return self.converge_on_existing(existing).await;
        }

        let txn = Transaction::pending(booking_id, user_id, amount, &self.currency);
        match self.store.insert_pending(&txn).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::DuplicateKey => {
                // Lost the insert race; the winner's row is authoritative.
                let existing = self
                    .store
                    .find_by_idempotency_key(&key)
                    .await?
                    .ok_or_else(|| {
                        PaymentError::Internal(format!("Row for {} vanished after conflict", key))
                    })?;
                return self.converge_on_existing(existing).await;
            }
        }

        info!(
            booking_id,
            user_id,
            transaction_id = %txn.transaction_id,
            amount = %amount,
            gateway = self.gateway.name(),
            "Charging"
        );

        let request = ChargeRequest {
            idempotency_key: key,
            booking_id,
            user_id,
            amount,
            currency: self.currency.clone(),
        };

        let outcome = match tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.charge(&request),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(GatewayError::Timeout)) | Err(_) => {
                warn!(
                    booking_id,
                    transaction_id = %txn.transaction_id,
                    "Gateway deadline exceeded; transaction left PENDING for the sweeper"
                );
                return Err(PaymentError::GatewayTimeout);
            }
            Ok(Err(GatewayError::Unavailable(e))) => {
                warn!(
                    booking_id,
                    transaction_id = %txn.transaction_id,
                    error = %e,
                    "Gateway unreachable; transaction left PENDING for the sweeper"
                );
                return Err(PaymentError::GatewayUnavailable(e));
            }
        };

        let resolved = self.resolve(txn, outcome).await?;
        self.publish_result(&resolved).await;
        Ok(resolved)
    }

    /// A row already exists for the key: never re-charge. Terminal rows
    /// re-emit their result so a crash between persist and publish heals
    /// on redelivery; PENDING rows belong to the sweeper.
    async fn converge_on_existing(
        &self,
        existing: Transaction,
    ) -> Result<Transaction, PaymentError> {
        match existing.status {
            TransactionStatus::Pending => {
                debug!(
                    transaction_id = %existing.transaction_id,
                    "Replay while charge unresolved; deferring to the sweeper"
                );
            }
            _ => {
                debug!(
                    transaction_id = %existing.transaction_id,
                    status = %existing.status,
                    "Replay of completed charge; re-emitting result"
                );
                self.publish_result(&existing).await;
            }
        }
        Ok(existing)
    }

    /// Persist the gateway outcome with a status-guarded transition.
    async fn resolve(
        &self,
        mut txn: Transaction,
        outcome: ChargeOutcome,
    ) -> Result<Transaction, PaymentError> {
        let transitioned = match &outcome {
            ChargeOutcome::Approved { reference } => {
                self.store.mark_success(txn.transaction_id, reference).await?
            }
            ChargeOutcome::Declined { reason } => {
                self.store.mark_failed(txn.transaction_id, reason).await?
            }
        };

        if !transitioned {
            // The sweeper beat us to it; its resolution wins.
            return self
                .store
                .get(txn.transaction_id)
                .await?
                .ok_or_else(|| {
                    PaymentError::TransactionNotFound(txn.transaction_id.to_string())
                });
        }

        match outcome {
            ChargeOutcome::Approved { reference } => {
                txn.status = TransactionStatus::Success;
                txn.gateway_reference = Some(reference);
            }
            ChargeOutcome::Declined { reason } => {
                txn.status = TransactionStatus::Failed;
                txn.failure_reason = Some(reason);
            }
        }
        txn.updated_at = Utc::now();
        Ok(txn)
    }

    /// Emit the saga event matching a terminal transaction. Publish
    /// failures are logged, not fatal: the row is the source of truth
    /// and redelivery or the sweeper re-emits.
    pub(crate) async fn publish_result(&self, txn: &Transaction) {
        let key = txn.booking_id.to_string();

        let result = match txn.status {
            TransactionStatus::Success => {
                let event = PaymentSuccess {
                    booking_id: txn.booking_id,
                    transaction_id: txn.transaction_id.to_string(),
                    user_id: txn.user_id,
                    amount: txn.amount,
                    gateway_reference: txn.gateway_reference.clone().unwrap_or_default(),
                    timestamp: Utc::now(),
                };
                self.publisher
                    .publish_json(Topic::PaymentSuccess, &key, &event)
                    .await
            }
            TransactionStatus::Failed => {
                let event = PaymentFailed {
                    booking_id: txn.booking_id,
                    user_id: txn.user_id,
                    reason: txn.failure_reason.clone().unwrap_or_default(),
                    timestamp: Utc::now(),
                };
                self.publisher
                    .publish_json(Topic::PaymentFailed, &key, &event)
                    .await
            }
            TransactionStatus::Pending => return,
        };

        if let Err(e) = result {
            error!(
                booking_id = txn.booking_id,
                transaction_id = %txn.transaction_id,
                error = %e,
                "Failed to publish payment result; row remains source of truth"
            );
        }
    }
}

/// `booking.created` consumer (group `payment-engine`)
pub struct BookingCreatedHandler {
    engine: Arc<PaymentEngine>,
}

impl BookingCreatedHandler {
    pub fn new(engine: Arc<PaymentEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait::async_trait]
impl EventHandler for BookingCreatedHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<(), ConsumeError> {
        let event: BookingCreated = serde_json::from_str(&envelope.payload)
            .map_err(|e| ConsumeError::Fatal(format!("Undecodable BookingCreated: {}", e)))?;

        match self
            .engine
            .process(event.booking_id, event.user_id, event.amount)
            .await
        {
            Ok(_) => Ok(()),
            // No definitive outcome: the PENDING row now belongs to the
            // sweeper; redelivering would never re-charge anyway.
            Err(PaymentError::GatewayTimeout) | Err(PaymentError::GatewayUnavailable(_)) => Ok(()),
            // Store outage: redeliver and try again.
            Err(PaymentError::DatabaseError(e)) => Err(ConsumeError::Transient(e)),
            Err(other) => Err(ConsumeError::Fatal(other.to_string())),
        }
    }
}
