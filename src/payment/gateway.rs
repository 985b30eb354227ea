//! Payment gateway adapters
//!
//! The gateway is an opaque dependency, synchronous from the engine's
//! point of view. Adapters must honour the idempotency key: charging the
//! same key twice has to return the original outcome, and `lookup` lets
//! the sweeper resolve charges whose first answer was lost to a timeout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::core_types::{BookingId, UserId};

/// Charge request forwarded to the processor
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub idempotency_key: String,
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
}

/// Definitive answer from the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved { reference: String },
    Declined { reason: String },
}

/// Transport-level gateway failures (no definitive outcome)
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Gateway timed out")]
    Timeout,

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// Gateway adapter trait
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Get adapter name for logging
    fn name(&self) -> &'static str;

    /// Submit one charge. Must be idempotent per key.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError>;

    /// Query the recorded outcome for a key, if the processor ever saw it.
    async fn lookup(&self, idempotency_key: &str)
    -> Result<Option<ChargeOutcome>, GatewayError>;
}

// ============================================================
// MOCK GATEWAY
// ============================================================

/// Decline reasons the mock draws from (closed set).
pub const DECLINE_REASONS: [&str; 4] = [
    "Card declined",
    "Insufficient funds",
    "Card expired",
    "Issuer unavailable",
];

/// Stochastic reference gateway: 90% approval, 1-2 s latency.
///
/// Records every outcome per idempotency key, so a repeated charge for
/// the same key replays the original answer, and counts invocations for
/// the exactly-once tests.
pub struct MockGateway {
    success_rate: f64,
    latency: Duration,
    outcomes: DashMap<String, ChargeOutcome>,
    charge_count: AtomicUsize,
    reference_seq: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::with_behaviour(0.9, Duration::from_millis(1500))
    }

    /// Deterministic variant for tests: always approves, no latency.
    pub fn approving() -> Self {
        Self::with_behaviour(1.0, Duration::ZERO)
    }

    /// Deterministic variant for tests: always declines, no latency.
    pub fn declining() -> Self {
        Self::with_behaviour(0.0, Duration::ZERO)
    }

    pub fn with_behaviour(success_rate: f64, latency: Duration) -> Self {
        Self {
            success_rate,
            latency,
            outcomes: DashMap::new(),
            charge_count: AtomicUsize::new(0),
            reference_seq: AtomicUsize::new(1),
        }
    }

    /// Total `charge` invocations (idempotent replays included).
    pub fn charge_count(&self) -> usize {
        self.charge_count.load(Ordering::SeqCst)
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        self.charge_count.fetch_add(1, Ordering::SeqCst);

        if let Some(recorded) = self.outcomes.get(&request.idempotency_key) {
            debug!(
                idempotency_key = %request.idempotency_key,
                "Mock gateway replaying recorded outcome"
            );
            return Ok(recorded.clone());
        }

        // Draw before the await; the rng is not Send.
        let (approve, jitter, reason_idx) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_bool(self.success_rate.clamp(0.0, 1.0)),
                rng.gen_range(0.0..=1.0f64),
                rng.gen_range(0..DECLINE_REASONS.len()),
            )
        };
        if !self.latency.is_zero() {
            // 1x-2x of the configured base latency.
            tokio::time::sleep(self.latency.mul_f64(1.0 + jitter)).await;
        }

        let outcome = if approve {
            let seq = self.reference_seq.fetch_add(1, Ordering::SeqCst);
            ChargeOutcome::Approved {
                reference: format!("MOCK-{:08}", seq),
            }
        } else {
            ChargeOutcome::Declined {
                reason: DECLINE_REASONS[reason_idx].to_string(),
            }
        };

        self.outcomes
            .insert(request.idempotency_key.clone(), outcome.clone());
        Ok(outcome)
    }

    async fn lookup(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<ChargeOutcome>, GatewayError> {
        Ok(self.outcomes.get(idempotency_key).map(|o| o.clone()))
    }
}

// ============================================================
// HTTP GATEWAY
// ============================================================

/// Adapter for a real HTTP payment processor.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ChargeBody<'a> {
    idempotency_key: &'a str,
    booking_id: BookingId,
    user_id: UserId,
    amount: Decimal,
    currency: &'a str,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeReply {
    approved: bool,
    reference: Option<String>,
    reason: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn map_reply(reply: ChargeReply) -> Result<ChargeOutcome, GatewayError> {
        if reply.approved {
            let reference = reply
                .reference
                .ok_or_else(|| GatewayError::Unavailable("approved without reference".into()))?;
            Ok(ChargeOutcome::Approved { reference })
        } else {
            Ok(ChargeOutcome::Declined {
                reason: reply.reason.unwrap_or_else(|| "Declined".to_string()),
            })
        }
    }

    fn map_transport(e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, GatewayError> {
        let body = ChargeBody {
            idempotency_key: &request.idempotency_key,
            booking_id: request.booking_id,
            user_id: request.user_id,
            amount: request.amount,
            currency: &request.currency,
        };

        let reply: ChargeReply = self
            .client
            .post(format!("{}/charges", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?
            .error_for_status()
            .map_err(Self::map_transport)?
            .json()
            .await
            .map_err(Self::map_transport)?;

        Self::map_reply(reply)
    }

    async fn lookup(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<ChargeOutcome>, GatewayError> {
        let response = self
            .client
            .get(format!("{}/charges/{}", self.base_url, idempotency_key))
            .send()
            .await
            .map_err(Self::map_transport)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let reply: ChargeReply = response
            .error_for_status()
            .map_err(Self::map_transport)?
            .json()
            .await
            .map_err(Self::map_transport)?;
        Self::map_reply(reply).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(key: &str) -> ChargeRequest {
        ChargeRequest {
            idempotency_key: key.to_string(),
            booking_id: 1,
            user_id: 2,
            amount: Decimal::new(200, 0),
            currency: "INR".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_approves_and_records() {
        let gateway = MockGateway::approving();

        let outcome = gateway.charge(&request("k1")).await.unwrap();
        assert!(matches!(outcome, ChargeOutcome::Approved { .. }));

        let looked_up = gateway.lookup("k1").await.unwrap();
        assert_eq!(looked_up, Some(outcome));
        assert_eq!(gateway.lookup("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_replays_same_outcome_per_key() {
        let gateway = MockGateway::approving();

        let first = gateway.charge(&request("k1")).await.unwrap();
        let second = gateway.charge(&request("k1")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.charge_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_decline_uses_closed_reason_set() {
        let gateway = MockGateway::declining();

        match gateway.charge(&request("k1")).await.unwrap() {
            ChargeOutcome::Declined { reason } => {
                assert!(DECLINE_REASONS.contains(&reason.as_str()));
            }
            other => panic!("expected decline, got {:?}", other),
        }
    }
}
