//! Booking aggregate
//!
//! Status IDs are designed for PostgreSQL storage as SMALLINT.
//! Terminal states: CONFIRMED (10), FAILED (-10), CANCELLED (-20),
//! EXPIRED (-30).

use std::fmt;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;

use crate::core_types::{BookingId, EventId, SeatId, UserId};

/// Booking lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum BookingStatus {
    /// Created, waiting for the payment result
    Pending = 0,

    /// Terminal: payment succeeded, seats are sold
    Confirmed = 10,

    /// Terminal: payment failed, seats were released
    Failed = -10,

    /// Terminal: cancelled by the buyer before confirmation
    Cancelled = -20,

    /// Terminal: no payment result before the deadline
    Expired = -30,
}

impl BookingStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }

    /// Get the numeric state ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(BookingStatus::Pending),
            10 => Some(BookingStatus::Confirmed),
            -10 => Some(BookingStatus::Failed),
            -20 => Some(BookingStatus::Cancelled),
            -30 => Some(BookingStatus::Expired),
            _ => None,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Failed => "FAILED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One booking attempt
///
/// `expires_at` is immutable after creation; the expiry sweeper uses it,
/// never mutates it.
#[derive(Debug, Clone)]
pub struct Booking {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub amount: Decimal,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl Booking {
    /// Fresh PENDING booking expiring `expiry` from now.
    pub fn pending(
        booking_id: BookingId,
        user_id: UserId,
        event_id: EventId,
        seat_ids: Vec<SeatId>,
        amount: Decimal,
        expiry: std::time::Duration,
    ) -> Self {
        let now = Utc::now();
        let expiry = ChronoDuration::from_std(expiry).unwrap_or_else(|_| ChronoDuration::seconds(600));
        Self {
            booking_id,
            user_id,
            event_id,
            seat_ids,
            amount,
            status: BookingStatus::Pending,
            created_at: now,
            confirmed_at: None,
            expires_at: now + expiry,
        }
    }
}
