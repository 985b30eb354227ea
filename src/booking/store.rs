//! Booking persistence
//!
//! All state updates use atomic CAS on the status column; the saga
//! consumers and the expiry sweeper may race on the same booking and
//! exactly one transition wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::{PgPool, Row};

use super::error::BookingError;
use super::types::{Booking, BookingStatus};
use crate::core_types::{BookingId, UserId};

/// Booking store operations
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), BookingError>;

    async fn get(&self, booking_id: BookingId) -> Result<Option<Booking>, BookingError>;

    /// All bookings of one user, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError>;

    /// Atomic CAS: transition only when the current status matches
    /// `expected`. `confirmed_at` is written together with the status
    /// (pass `Some` on the CONFIRMED transition only).
    ///
    /// Returns true if this call performed the transition.
    async fn update_status_if(
        &self,
        booking_id: BookingId,
        expected: BookingStatus,
        new: BookingStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, BookingError>;

    /// PENDING bookings whose `expires_at` has passed, oldest first.
    async fn find_expired(&self, limit: usize) -> Result<Vec<Booking>, BookingError>;
}

// ============================================================
// IN-MEMORY STORE
// ============================================================

/// In-memory booking store
#[derive(Default)]
pub struct MemoryBookingStore {
    bookings: DashMap<BookingId, Booking>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), BookingError> {
        self.bookings.insert(booking.booking_id, booking.clone());
        Ok(())
    }

    async fn get(&self, booking_id: BookingId) -> Result<Option<Booking>, BookingError> {
        Ok(self.bookings.get(&booking_id).map(|b| b.clone()))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        let mut result: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|b| b.user_id == user_id)
            .map(|b| b.clone())
            .collect();
        result.sort_by(|a, b| b.booking_id.cmp(&a.booking_id));
        Ok(result)
    }

    async fn update_status_if(
        &self,
        booking_id: BookingId,
        expected: BookingStatus,
        new: BookingStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, BookingError> {
        // get_mut holds the shard lock for the whole read-modify-write.
        let Some(mut booking) = self.bookings.get_mut(&booking_id) else {
            return Err(BookingError::BookingNotFound(booking_id));
        };
        if booking.status != expected {
            return Ok(false);
        }
        booking.status = new;
        if confirmed_at.is_some() {
            booking.confirmed_at = confirmed_at;
        }
        Ok(true)
    }

    async fn find_expired(&self, limit: usize) -> Result<Vec<Booking>, BookingError> {
        let now = Utc::now();
        let mut due: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Pending && b.expires_at < now)
            .map(|b| b.clone())
            .collect();
        due.sort_by_key(|b| b.expires_at);
        due.truncate(limit);
        Ok(due)
    }
}

// ============================================================
// POSTGRESQL STORE
// ============================================================

/// PostgreSQL booking store
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_booking(row: &sqlx::postgres::PgRow) -> Result<Booking, BookingError> {
        let status_id: i16 = row.get("status");
        let status = BookingStatus::from_id(status_id)
            .ok_or_else(|| BookingError::SystemError(format!("Invalid status ID: {}", status_id)))?;

        Ok(Booking {
            booking_id: row.get::<i64, _>("booking_id") as u64,
            user_id: row.get::<i64, _>("user_id") as u64,
            event_id: row.get::<i64, _>("event_id") as u64,
            seat_ids: row.get("seat_ids"),
            amount: row.get("amount"),
            status,
            created_at: row.get("created_at"),
            confirmed_at: row.get("confirmed_at"),
            expires_at: row.get("expires_at"),
        })
    }
}

const BOOKING_COLUMNS: &str = "booking_id, user_id, event_id, seat_ids, amount, status, \
                               created_at, confirmed_at, expires_at";

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), BookingError> {
        sqlx::query(
            r#"
            INSERT INTO bookings_tb
                (booking_id, user_id, event_id, seat_ids, amount, status,
                 created_at, confirmed_at, expires_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.booking_id as i64)
        .bind(booking.user_id as i64)
        .bind(booking.event_id as i64)
        .bind(&booking.seat_ids)
        .bind(booking.amount)
        .bind(booking.status.id())
        .bind(booking.created_at)
        .bind(booking.confirmed_at)
        .bind(booking.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, booking_id: BookingId) -> Result<Option<Booking>, BookingError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM bookings_tb WHERE booking_id = $1",
            BOOKING_COLUMNS
        ))
        .bind(booking_id as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_booking).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bookings_tb WHERE user_id = $1 ORDER BY booking_id DESC",
            BOOKING_COLUMNS
        ))
        .bind(user_id as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_booking).collect()
    }

    async fn update_status_if(
        &self,
        booking_id: BookingId,
        expected: BookingStatus,
        new: BookingStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, BookingError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings_tb
            SET status = $1, confirmed_at = COALESCE($2, confirmed_at)
            WHERE booking_id = $3 AND status = $4
            "#,
        )
        .bind(new.id())
        .bind(confirmed_at)
        .bind(booking_id as i64)
        .bind(expected.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_expired(&self, limit: usize) -> Result<Vec<Booking>, BookingError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM bookings_tb
            WHERE status = $1 AND expires_at < NOW()
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
            BOOKING_COLUMNS
        ))
        .bind(BookingStatus::Pending.id())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_booking).collect()
    }
}
