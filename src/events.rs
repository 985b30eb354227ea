//! Saga events - inter-service communication contracts
//!
//! The four messages that glue the reservation pipeline together,
//! serialised as camelCase JSON on the event bus.
//!
//! # Message Flow
//!
//! ```text
//! Saga → BookingCreated → Payment Engine → PaymentSuccess ┐
//!                                        → PaymentFailed  ┤→ Saga
//! Saga → BookingConfirmed → Notification / Event Catalog  ┘
//! ```
//!
//! Every topic is partitioned by `bookingId`, so per-booking ordering
//! follows from per-partition FIFO. Exactly-once is an application-layer
//! property (idempotency keys and status-guarded transitions), never a
//! broker one.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{BookingId, EventId, SeatId, UserId};

// ============================================================
// TOPICS
// ============================================================

/// Typed bus topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Saga → Payment Engine
    BookingCreated,
    /// Payment Engine → Saga, Notification
    PaymentSuccess,
    /// Payment Engine → Saga, Notification
    PaymentFailed,
    /// Saga → Notification, Event Catalog
    BookingConfirmed,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::BookingCreated => "booking.created",
            Topic::PaymentSuccess => "payment.success",
            Topic::PaymentFailed => "payment.failed",
            Topic::BookingConfirmed => "booking.confirmed",
        }
    }

    pub const ALL: [Topic; 4] = [
        Topic::BookingCreated,
        Topic::PaymentSuccess,
        Topic::PaymentFailed,
        Topic::BookingConfirmed,
    ];
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Topic {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booking.created" => Ok(Topic::BookingCreated),
            "payment.success" => Ok(Topic::PaymentSuccess),
            "payment.failed" => Ok(Topic::PaymentFailed),
            "booking.confirmed" => Ok(Topic::BookingConfirmed),
            _ => Err(()),
        }
    }
}

// ============================================================
// PAYLOADS
// ============================================================

/// Emitted by the saga once a PENDING booking row exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreated {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Emitted by the payment engine after a successful charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSuccess {
    pub booking_id: BookingId,
    pub transaction_id: String,
    pub user_id: UserId,
    pub amount: Decimal,
    pub gateway_reference: String,
    pub timestamp: DateTime<Utc>,
}

/// Emitted by the payment engine after a declined charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Emitted by the saga on the PENDING → CONFIRMED transition, enriched
/// with catalog metadata for downstream notification templating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmed {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub event_name: String,
    pub event_date: Option<DateTime<Utc>>,
    pub seat_ids: Vec<SeatId>,
    pub timestamp: DateTime<Utc>,
}
