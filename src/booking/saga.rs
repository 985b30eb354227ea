//! Booking saga orchestration
//!
//! Drives the booking state machine. Every transition re-checks the
//! current status with a store-level CAS, so duplicate event delivery,
//! user cancellation and the expiry sweeper can all race on the same
//! booking without a double transition.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::error::BookingError;
use super::store::BookingStore;
use super::types::{Booking, BookingStatus};
use crate::bus::{ConsumeError, Envelope, EventHandler, RetryingPublisher};
use crate::catalog::EventCatalog;
use crate::core_types::{BookingId, EventId, SeatId, UserId};
use crate::events::{
    BookingConfirmed, BookingCreated, PaymentFailed, PaymentSuccess, Topic,
};
use crate::reservation::SeatLockService;

/// Service epoch for booking ids: 2025-01-01T00:00:00Z.
///
/// Counting milliseconds from here instead of 1970 keeps the 42-bit
/// timestamp field in range until the 2160s.
const ID_EPOCH_MS: u64 = 1_735_689_600_000;

/// Booking id generator
///
/// Ids pack `ms since ID_EPOCH (42 bits) | node (6 bits) | sequence
/// (16 bits)`, so they sort by creation time - the only property the
/// stores rely on. The widths fit this deployment: up to 64 saga
/// instances and 65 536 bookings per node per millisecond, far above
/// any sale peak.
struct BookingIdGenerator {
    node_id: u8,
    sequence: u16,
    last_ms: u64,
}

impl BookingIdGenerator {
    fn new(node_id: u8) -> Self {
        Self {
            // Only 6 bits travel into the id.
            node_id: node_id & 0x3F,
            sequence: 0,
            last_ms: 0,
        }
    }

    fn generate(&mut self) -> BookingId {
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let ms = now_ms.saturating_sub(ID_EPOCH_MS);

        if ms == self.last_ms {
            self.sequence = self.sequence.wrapping_add(1);
        } else {
            self.sequence = 0;
            self.last_ms = ms;
        }

        (ms << 22) | ((self.node_id as u64) << 16) | self.sequence as u64
    }
}

/// Saga tuning knobs
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// PENDING lifetime before the sweeper expires a booking.
    pub booking_expiry: Duration,
    /// Node id baked into generated booking ids (6 bits used).
    pub node_id: u8,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            booking_expiry: Duration::from_secs(600),
            node_id: 1,
        }
    }
}

/// Booking saga - orchestrates the reservation workflow
pub struct BookingSaga {
    store: Arc<dyn BookingStore>,
    locks: Arc<SeatLockService>,
    catalog: Arc<dyn EventCatalog>,
    publisher: RetryingPublisher,
    id_gen: Mutex<BookingIdGenerator>,
    config: SagaConfig,
}

impl BookingSaga {
    pub fn new(
        store: Arc<dyn BookingStore>,
        locks: Arc<SeatLockService>,
        catalog: Arc<dyn EventCatalog>,
        publisher: RetryingPublisher,
        config: SagaConfig,
    ) -> Self {
        Self {
            store,
            locks,
            catalog,
            publisher,
            id_gen: Mutex::new(BookingIdGenerator::new(config.node_id)),
            config,
        }
    }

    /// Create a PENDING booking for seats the user already locked.
    ///
    /// Ownership is re-verified against the lock store so a booking can
    /// never reference seats someone else holds.
    pub async fn create_booking(
        &self,
        user_id: UserId,
        event_id: EventId,
        seat_ids: Vec<SeatId>,
        amount: Decimal,
    ) -> Result<Booking, BookingError> {
        if user_id == 0 {
            return Err(BookingError::Forbidden);
        }
        if seat_ids.is_empty() {
            return Err(BookingError::NoSeatsRequested);
        }
        if amount <= Decimal::ZERO {
            return Err(BookingError::InvalidAmount);
        }

        if !self
            .locks
            .verify_ownership(event_id, &seat_ids, user_id)
            .await?
        {
            return Err(BookingError::SeatsNotOwned);
        }

        let booking_id = {
            let mut id_generator = self.id_gen.lock().unwrap();
            id_generator.generate()
        };

        let booking = Booking::pending(
            booking_id,
            user_id,
            event_id,
            seat_ids,
            amount,
            self.config.booking_expiry,
        );
        self.store.insert(&booking).await?;
        info!(
            booking_id,
            user_id,
            event_id,
            seats = booking.seat_ids.len(),
            amount = %amount,
            "Booking created"
        );

        let event = BookingCreated {
            booking_id,
            user_id,
            event_id,
            seat_ids: booking.seat_ids.clone(),
            amount,
            timestamp: Utc::now(),
        };
        if let Err(e) = self
            .publisher
            .publish_json(Topic::BookingCreated, &booking_id.to_string(), &event)
            .await
        {
            // The booking row exists; if no payment result ever arrives
            // the expiry sweeper reclaims the seats.
            error!(booking_id, error = %e, "Failed to publish BookingCreated");
        }

        Ok(booking)
    }

    /// `payment.success` transition: PENDING → CONFIRMED.
    ///
    /// Replays and late events are logged and ignored; missing bookings
    /// surface as [`BookingError::BookingNotFound`] so the consumer can
    /// redeliver (the row may not be visible yet).
    pub async fn on_payment_success(&self, booking_id: BookingId) -> Result<(), BookingError> {
        let booking = self
            .store
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;

        if booking.status != BookingStatus::Pending {
            info!(
                booking_id,
                status = %booking.status,
                "PaymentSuccess for non-PENDING booking; ignoring (idempotent replay)"
            );
            return Ok(());
        }

        if !self
            .store
            .update_status_if(
                booking_id,
                BookingStatus::Pending,
                BookingStatus::Confirmed,
                Some(Utc::now()),
            )
            .await?
        {
            info!(booking_id, "Lost the CONFIRMED race; ignoring");
            return Ok(());
        }

        info!(booking_id, user_id = booking.user_id, "Booking CONFIRMED");
        self.release_seats(&booking).await;
        self.publish_confirmed(&booking).await;
        Ok(())
    }

    /// `payment.failed` transition: PENDING → FAILED; seats go back on
    /// sale.
    pub async fn on_payment_failed(
        &self,
        booking_id: BookingId,
        reason: &str,
    ) -> Result<(), BookingError> {
        let booking = self
            .store
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;

        if booking.status != BookingStatus::Pending {
            info!(
                booking_id,
                status = %booking.status,
                "PaymentFailed for non-PENDING booking; ignoring (idempotent replay)"
            );
            return Ok(());
        }

        if !self
            .store
            .update_status_if(
                booking_id,
                BookingStatus::Pending,
                BookingStatus::Failed,
                None,
            )
            .await?
        {
            info!(booking_id, "Lost the FAILED race; ignoring");
            return Ok(());
        }

        warn!(booking_id, reason, "Booking FAILED; releasing seats");
        self.release_seats(&booking).await;
        Ok(())
    }

    /// Buyer-initiated cancellation. Confirmed bookings are immutable;
    /// cancelling an already-cancelled booking is a no-op.
    pub async fn cancel(&self, booking_id: BookingId, user_id: UserId) -> Result<(), BookingError> {
        let booking = self
            .store
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;

        // Load is by (id, user): someone else's booking does not exist
        // from this caller's point of view.
        if booking.user_id != user_id {
            return Err(BookingError::BookingNotFound(booking_id));
        }

        match booking.status {
            BookingStatus::Pending => {}
            BookingStatus::Cancelled => return Ok(()),
            BookingStatus::Confirmed => return Err(BookingError::AlreadyConfirmed),
            other => {
                return Err(BookingError::IllegalTransition(format!(
                    "{} -> CANCELLED",
                    other
                )));
            }
        }

        if !self
            .store
            .update_status_if(
                booking_id,
                BookingStatus::Pending,
                BookingStatus::Cancelled,
                None,
            )
            .await?
        {
            // A payment result or the sweeper won; report what actually
            // became of the booking, not a phantom cancellation.
            let current = self
                .store
                .get(booking_id)
                .await?
                .ok_or(BookingError::BookingNotFound(booking_id))?;
            return match current.status {
                BookingStatus::Cancelled => Ok(()),
                BookingStatus::Confirmed => Err(BookingError::AlreadyConfirmed),
                other => Err(BookingError::IllegalTransition(format!(
                    "{} -> CANCELLED",
                    other
                ))),
            };
        }

        info!(booking_id, user_id, "Booking CANCELLED by user");
        self.release_seats(&booking).await;
        Ok(())
    }

    /// Expire one overdue booking: PENDING → EXPIRED plus seat release.
    /// Returns whether this call performed the transition.
    pub async fn expire_booking(&self, booking: &Booking) -> Result<bool, BookingError> {
        if !self
            .store
            .update_status_if(
                booking.booking_id,
                BookingStatus::Pending,
                BookingStatus::Expired,
                None,
            )
            .await?
        {
            // A payment result or cancel landed first; nothing to do.
            return Ok(false);
        }

        info!(
            booking_id = booking.booking_id,
            user_id = booking.user_id,
            "Booking EXPIRED; releasing seats"
        );
        self.release_seats(booking).await;
        Ok(true)
    }

    /// Expire every overdue PENDING booking, up to `limit`.
    pub async fn expire_due(&self, limit: usize) -> Result<usize, BookingError> {
        let due = self.store.find_expired(limit).await?;
        let mut expired = 0;
        for booking in &due {
            if self.expire_booking(booking).await? {
                expired += 1;
            }
        }
        Ok(expired)
    }

    pub async fn get_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Booking>, BookingError> {
        self.store.get(booking_id).await
    }

    pub async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        self.store.list_for_user(user_id).await
    }

    /// Terminal-transition lock release. Failures are logged, never
    /// fatal: the lock TTL reclaims anything missed here.
    async fn release_seats(&self, booking: &Booking) {
        if let Err(e) = self
            .locks
            .release_many(booking.event_id, &booking.seat_ids, booking.user_id)
            .await
        {
            warn!(
                booking_id = booking.booking_id,
                error = %e,
                "Seat release failed; locks will TTL-expire"
            );
        }
    }

    async fn publish_confirmed(&self, booking: &Booking) {
        let info = self.catalog.event_info(booking.event_id).await;
        let event = BookingConfirmed {
            booking_id: booking.booking_id,
            user_id: booking.user_id,
            event_id: booking.event_id,
            event_name: info.as_ref().map(|i| i.name.clone()).unwrap_or_default(),
            event_date: info.and_then(|i| i.date),
            seat_ids: booking.seat_ids.clone(),
            timestamp: Utc::now(),
        };

        if let Err(e) = self
            .publisher
            .publish_json(
                Topic::BookingConfirmed,
                &booking.booking_id.to_string(),
                &event,
            )
            .await
        {
            error!(
                booking_id = booking.booking_id,
                error = %e,
                "Failed to publish BookingConfirmed"
            );
        }
    }
}

/// `payment.success` / `payment.failed` consumer (group `booking-saga`)
pub struct PaymentResultHandler {
    saga: Arc<BookingSaga>,
}

impl PaymentResultHandler {
    pub fn new(saga: Arc<BookingSaga>) -> Self {
        Self { saga }
    }
}

#[async_trait::async_trait]
impl EventHandler for PaymentResultHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<(), ConsumeError> {
        let result = match envelope.topic {
            Topic::PaymentSuccess => {
                let event: PaymentSuccess = serde_json::from_str(&envelope.payload)
                    .map_err(|e| ConsumeError::Fatal(format!("Undecodable PaymentSuccess: {}", e)))?;
                self.saga.on_payment_success(event.booking_id).await
            }
            Topic::PaymentFailed => {
                let event: PaymentFailed = serde_json::from_str(&envelope.payload)
                    .map_err(|e| ConsumeError::Fatal(format!("Undecodable PaymentFailed: {}", e)))?;
                self.saga
                    .on_payment_failed(event.booking_id, &event.reason)
                    .await
            }
            other => {
                return Err(ConsumeError::Fatal(format!(
                    "Unexpected topic for payment-result consumer: {}",
                    other
                )));
            }
        };

        match result {
            Ok(()) => Ok(()),
            // Cross-partition lag: the booking row may not be visible
            // yet. Redeliver with backoff; the DLQ catches true orphans.
            Err(BookingError::BookingNotFound(id)) => Err(ConsumeError::Transient(format!(
                "Booking {} not visible yet",
                id
            ))),
            Err(BookingError::DatabaseError(e)) | Err(BookingError::LockStore(e)) => {
                Err(ConsumeError::Transient(e))
            }
            Err(other) => {
                debug!(error = %other, "Non-retriable consume failure");
                Err(ConsumeError::Fatal(other.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::store::MemoryBookingStore;
    use crate::bus::{BusConfig, MemoryBus};
    use crate::catalog::StaticCatalog;
    use crate::kvstore::MemoryKvStore;

    struct Fixture {
        saga: Arc<BookingSaga>,
        locks: Arc<SeatLockService>,
        store: Arc<MemoryBookingStore>,
    }

    fn fixture() -> Fixture {
        fixture_with_expiry(Duration::from_secs(600))
    }

    fn fixture_with_expiry(expiry: Duration) -> Fixture {
        let kv = Arc::new(MemoryKvStore::new());
        let locks = Arc::new(SeatLockService::new(kv));
        let store = Arc::new(MemoryBookingStore::new());
        let bus = Arc::new(MemoryBus::new(BusConfig::default()));
        let publisher = RetryingPublisher::with_retries(bus, 1, Duration::from_millis(1));
        let saga = Arc::new(BookingSaga::new(
            store.clone(),
            locks.clone(),
            Arc::new(StaticCatalog::new()),
            publisher,
            SagaConfig {
                booking_expiry: expiry,
                ..SagaConfig::default()
            },
        ));
        Fixture { saga, locks, store }
    }

    fn seats(ids: &[&str]) -> Vec<SeatId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    async fn locked_booking(fx: &Fixture, user: UserId) -> Booking {
        let seat_ids = seats(&["A1", "A2"]);
        assert!(fx.locks.try_lock_many(1, &seat_ids, user).await.unwrap());
        fx.saga
            .create_booking(user, 1, seat_ids, Decimal::new(200, 0))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_requires_ownership() {
        let fx = fixture();

        let result = fx
            .saga
            .create_booking(7, 1, seats(&["A1"]), Decimal::new(100, 0))
            .await;
        assert!(matches!(result, Err(BookingError::SeatsNotOwned)));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let fx = fixture();

        assert!(matches!(
            fx.saga.create_booking(7, 1, vec![], Decimal::ONE).await,
            Err(BookingError::NoSeatsRequested)
        ));
        assert!(matches!(
            fx.saga
                .create_booking(7, 1, seats(&["A1"]), Decimal::ZERO)
                .await,
            Err(BookingError::InvalidAmount)
        ));
        assert!(matches!(
            fx.saga.create_booking(0, 1, seats(&["A1"]), Decimal::ONE).await,
            Err(BookingError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_payment_success_confirms_and_releases() {
        let fx = fixture();
        let booking = locked_booking(&fx, 7).await;

        fx.saga.on_payment_success(booking.booking_id).await.unwrap();

        let stored = fx.store.get(booking.booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert!(stored.confirmed_at.is_some());
        assert!(!fx.locks.is_locked(1, "A1").await.unwrap());
        assert!(!fx.locks.is_locked(1, "A2").await.unwrap());
    }

    #[tokio::test]
    async fn test_payment_success_replay_is_noop() {
        let fx = fixture();
        let booking = locked_booking(&fx, 7).await;

        fx.saga.on_payment_success(booking.booking_id).await.unwrap();
        let confirmed_at = fx
            .store
            .get(booking.booking_id)
            .await
            .unwrap()
            .unwrap()
            .confirmed_at;

        fx.saga.on_payment_success(booking.booking_id).await.unwrap();
        let stored = fx.store.get(booking.booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(stored.confirmed_at, confirmed_at);
    }

    #[tokio::test]
    async fn test_payment_failed_releases_for_reattempt() {
        let fx = fixture();
        let booking = locked_booking(&fx, 7).await;

        fx.saga
            .on_payment_failed(booking.booking_id, "Card declined")
            .await
            .unwrap();

        let stored = fx.store.get(booking.booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Failed);
        // Another buyer can take the seat now.
        assert!(fx.locks.try_lock(1, "A1", 99).await.unwrap());
    }

    #[tokio::test]
    async fn test_payment_result_unknown_booking() {
        let fx = fixture();
        assert!(matches!(
            fx.saga.on_payment_success(12345).await,
            Err(BookingError::BookingNotFound(12345))
        ));
    }

    #[tokio::test]
    async fn test_cancel_pending() {
        let fx = fixture();
        let booking = locked_booking(&fx, 7).await;

        fx.saga.cancel(booking.booking_id, 7).await.unwrap();

        let stored = fx.store.get(booking.booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert!(!fx.locks.is_locked(1, "A1").await.unwrap());

        // Cancel again: idempotent.
        fx.saga.cancel(booking.booking_id, 7).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_after_failure_reports_conflict() {
        let fx = fixture();
        let booking = locked_booking(&fx, 7).await;
        fx.saga
            .on_payment_failed(booking.booking_id, "Card declined")
            .await
            .unwrap();

        // The booking did not get cancelled; it failed. Say so.
        assert!(matches!(
            fx.saga.cancel(booking.booking_id, 7).await,
            Err(BookingError::IllegalTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_confirmed_rejected() {
        let fx = fixture();
        let booking = locked_booking(&fx, 7).await;
        fx.saga.on_payment_success(booking.booking_id).await.unwrap();

        assert!(matches!(
            fx.saga.cancel(booking.booking_id, 7).await,
            Err(BookingError::AlreadyConfirmed)
        ));
    }

    #[tokio::test]
    async fn test_cancel_wrong_user_is_not_found() {
        let fx = fixture();
        let booking = locked_booking(&fx, 7).await;

        assert!(matches!(
            fx.saga.cancel(booking.booking_id, 8).await,
            Err(BookingError::BookingNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expire_due_only_touches_overdue() {
        let fx = fixture_with_expiry(Duration::ZERO);
        let booking = locked_booking(&fx, 7).await;

        let expired = fx.saga.expire_due(100).await.unwrap();
        assert_eq!(expired, 1);

        let stored = fx.store.get(booking.booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Expired);
        assert!(!fx.locks.is_locked(1, "A1").await.unwrap());

        // Nothing left to expire.
        assert_eq!(fx.saga.expire_due(100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expire_races_payment_success() {
        let fx = fixture_with_expiry(Duration::ZERO);
        let booking = locked_booking(&fx, 7).await;

        // Payment result lands just before the sweeper.
        fx.saga.on_payment_success(booking.booking_id).await.unwrap();
        assert_eq!(fx.saga.expire_due(100).await.unwrap(), 0);

        let stored = fx.store.get(booking.booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
    }

    #[test]
    fn test_booking_ids_strictly_increase_and_never_repeat() {
        let mut id_generator = BookingIdGenerator::new(3);
        let mut seen = std::collections::HashSet::new();
        let mut previous = 0u64;

        // Well inside the 16-bit per-millisecond sequence budget.
        for _ in 0..10_000 {
            let id = id_generator.generate();
            assert!(id > previous, "ids must sort by generation order");
            assert!(seen.insert(id), "ids must never repeat");
            previous = id;
        }
    }

    #[test]
    fn test_booking_id_field_layout() {
        let mut id_generator = BookingIdGenerator::new(0xFF);
        let id = id_generator.generate();

        // Node field carries only the low 6 bits of the configured id.
        assert_eq!((id >> 16) & 0x3F, 0x3F);

        // Timestamp field counts from the service epoch, not 1970.
        let ms = id >> 22;
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        assert!(ms > 0);
        assert!(ms <= now_ms - ID_EPOCH_MS);
    }

    #[tokio::test]
    async fn test_booking_ids_monotonic() {
        let fx = fixture();
        let seat_a = seats(&["A1"]);
        let seat_b = seats(&["B1"]);
        fx.locks.try_lock_many(1, &seat_a, 7).await.unwrap();
        fx.locks.try_lock_many(1, &seat_b, 7).await.unwrap();

        let first = fx
            .saga
            .create_booking(7, 1, seat_a, Decimal::ONE)
            .await
            .unwrap();
        let second = fx
            .saga
            .create_booking(7, 1, seat_b, Decimal::ONE)
            .await
            .unwrap();
        assert!(second.booking_id > first.booking_id);
    }
}
