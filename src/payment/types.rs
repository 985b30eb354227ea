//! Transaction aggregate
//!
//! Status IDs are designed for PostgreSQL storage as SMALLINT.
//! Terminal states: SUCCESS (10), FAILED (-10).

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::core_types::{BookingId, UserId};

/// Deterministic idempotency key for one (booking, user) charge.
///
/// Unique-indexed on the transaction table; duplicate deliveries of the
/// same booking converge on one row through it.
pub fn idempotency_key(booking_id: BookingId, user_id: UserId) -> String {
    format!("booking_{}_user_{}", booking_id, user_id)
}

/// Transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum TransactionStatus {
    /// Charge initiated; outcome not yet durable
    Pending = 0,

    /// Terminal: gateway approved the charge
    Success = 10,

    /// Terminal: gateway declined the charge
    Failed = -10,
}

impl TransactionStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }

    /// Get the numeric state ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransactionStatus::Pending),
            10 => Some(TransactionStatus::Success),
            -10 => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One charge attempt against the gateway
///
/// Invariants: at most one row per idempotency key;
/// `gateway_reference` present iff SUCCESS; `failure_reason` present
/// iff FAILED.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub idempotency_key: String,
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Fresh PENDING transaction with a new v4 id.
    pub fn pending(
        booking_id: BookingId,
        user_id: UserId,
        amount: Decimal,
        currency: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            transaction_id: Uuid::new_v4(),
            idempotency_key: idempotency_key(booking_id, user_id),
            booking_id,
            user_id,
            amount,
            currency: currency.to_string(),
            status: TransactionStatus::Pending,
            gateway_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_format() {
        assert_eq!(idempotency_key(42, 7), "booking_42_user_7");
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransactionStatus::Success.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
    }

    #[test]
    fn test_status_id_roundtrip() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Success,
            TransactionStatus::Failed,
        ] {
            assert_eq!(TransactionStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(TransactionStatus::from_id(99), None);
    }

    #[test]
    fn test_pending_constructor() {
        let txn = Transaction::pending(42, 7, Decimal::new(200, 0), "INR");
        assert_eq!(txn.status, TransactionStatus::Pending);
        assert_eq!(txn.idempotency_key, "booking_42_user_7");
        assert!(txn.gateway_reference.is_none());
        assert!(txn.failure_reason.is_none());
    }
}
