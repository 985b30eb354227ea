//! End-to-end booking saga flows
//!
//! Full pipeline on the in-memory implementations: seat locks → booking
//! → `booking.created` → payment engine → payment result → saga
//! transition, with a recorder group standing in for the notification
//! service on `booking.confirmed`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;

use boxoffice::booking::{
    BookingSaga, BookingStatus, BookingStore, ExpirySweeper, ExpirySweeperConfig,
    MemoryBookingStore, PaymentResultHandler, SagaConfig,
};
use boxoffice::bus::{
    BusConfig, ConsumeError, Envelope, EventHandler, MemoryBus, RetryingPublisher,
};
use boxoffice::catalog::StaticCatalog;
use boxoffice::events::{BookingConfirmed, Topic};
use boxoffice::kvstore::MemoryKvStore;
use boxoffice::payment::{
    BookingCreatedHandler, MemoryTransactionStore, MockGateway, PaymentEngine, TransactionStatus,
    TransactionStore, idempotency_key,
};
use boxoffice::reservation::SeatLockService;

/// Recorder consumer standing in for the notification service.
#[derive(Default)]
struct Recorder {
    confirmed: Mutex<Vec<BookingConfirmed>>,
}

#[async_trait::async_trait]
impl EventHandler for Recorder {
    async fn handle(&self, envelope: &Envelope) -> Result<(), ConsumeError> {
        let event: BookingConfirmed = serde_json::from_str(&envelope.payload)
            .map_err(|e| ConsumeError::Fatal(e.to_string()))?;
        self.confirmed.lock().unwrap().push(event);
        Ok(())
    }
}

struct Pipeline {
    locks: Arc<SeatLockService>,
    saga: Arc<BookingSaga>,
    bookings: Arc<MemoryBookingStore>,
    transactions: Arc<MemoryTransactionStore>,
    gateway: Arc<MockGateway>,
    recorder: Arc<Recorder>,
    bus: Arc<MemoryBus>,
}

fn pipeline(gateway: MockGateway, booking_expiry: Duration) -> Pipeline {
    let kv = Arc::new(MemoryKvStore::new());
    let locks = Arc::new(SeatLockService::new(kv));
    let bookings = Arc::new(MemoryBookingStore::new());
    let transactions = Arc::new(MemoryTransactionStore::new());
    let gateway = Arc::new(gateway);
    let catalog = Arc::new(StaticCatalog::new());
    catalog.insert(1, "Arena Night", None);

    let bus = Arc::new(MemoryBus::new(BusConfig {
        partitions: 4,
        buffer: 256,
        max_attempts: 5,
        base_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(50),
    }));
    let publisher = RetryingPublisher::with_retries(bus.clone(), 3, Duration::from_millis(5));

    let saga = Arc::new(BookingSaga::new(
        bookings.clone(),
        locks.clone(),
        catalog,
        publisher.clone(),
        SagaConfig {
            booking_expiry,
            ..SagaConfig::default()
        },
    ));
    let engine = Arc::new(PaymentEngine::new(
        transactions.clone(),
        gateway.clone(),
        publisher,
    ));

    bus.subscribe(
        Topic::BookingCreated,
        "payment-engine",
        Arc::new(BookingCreatedHandler::new(engine)),
    );
    let results = Arc::new(PaymentResultHandler::new(saga.clone()));
    bus.subscribe(Topic::PaymentSuccess, "booking-saga", results.clone());
    bus.subscribe(Topic::PaymentFailed, "booking-saga", results);

    let recorder = Arc::new(Recorder::default());
    bus.subscribe(Topic::BookingConfirmed, "notification", recorder.clone());

    Pipeline {
        locks,
        saga,
        bookings,
        transactions,
        gateway,
        recorder,
        bus,
    }
}

fn seats(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Poll until the booking reaches `expected` or the deadline passes.
async fn wait_for_status(p: &Pipeline, booking_id: u64, expected: BookingStatus) {
    for _ in 0..200 {
        let booking = p.saga.get_booking(booking_id).await.unwrap().unwrap();
        if booking.status == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let current = p.saga.get_booking(booking_id).await.unwrap().unwrap();
    panic!(
        "booking {} never reached {}; stuck at {}",
        booking_id, expected, current.status
    );
}

/// Lock seats, book, pay, confirm: the full happy path.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn booking_confirms_and_releases_locks() {
    let p = pipeline(MockGateway::approving(), Duration::from_secs(600));
    let seat_ids = seats(&["A1", "A2"]);

    assert!(p.locks.try_lock_many(1, &seat_ids, 7).await.unwrap());
    let booking = p
        .saga
        .create_booking(7, 1, seat_ids.clone(), Decimal::new(200, 0))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);

    wait_for_status(&p, booking.booking_id, BookingStatus::Confirmed).await;

    let confirmed = p
        .saga
        .get_booking(booking.booking_id)
        .await
        .unwrap()
        .unwrap();
    assert!(confirmed.confirmed_at.is_some());

    // Terminal transition released both locks.
    assert!(!p.locks.is_locked(1, "A1").await.unwrap());
    assert!(!p.locks.is_locked(1, "A2").await.unwrap());

    // Exactly one SUCCESS transaction, one gateway charge.
    let txn = p
        .transactions
        .find_by_idempotency_key(&idempotency_key(booking.booking_id, 7))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(txn.status, TransactionStatus::Success);
    assert_eq!(p.gateway.charge_count(), 1);

    // Notification observed BookingConfirmed with catalog enrichment.
    for _ in 0..100 {
        if !p.recorder.confirmed.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let observed = p.recorder.confirmed.lock().unwrap();
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].booking_id, booking.booking_id);
    assert_eq!(observed[0].event_name, "Arena Night");
    assert_eq!(observed[0].seat_ids, seat_ids);
}

/// Declined payment fails the booking and puts the seats back on sale.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn declined_payment_fails_booking_and_frees_seats() {
    let p = pipeline(MockGateway::declining(), Duration::from_secs(600));
    let seat_ids = seats(&["A1", "A2"]);

    assert!(p.locks.try_lock_many(1, &seat_ids, 7).await.unwrap());
    let booking = p
        .saga
        .create_booking(7, 1, seat_ids, Decimal::new(200, 0))
        .await
        .unwrap();

    wait_for_status(&p, booking.booking_id, BookingStatus::Failed).await;

    // Another buyer can take A1 immediately.
    assert!(p.locks.try_lock(1, "A1", 99).await.unwrap());

    // No confirmation was ever emitted.
    assert!(p.recorder.confirmed.lock().unwrap().is_empty());
    assert_eq!(
        p.bus.dead_letters().len(),
        0,
        "no message should have been parked"
    );
}

/// Overdue PENDING booking: the sweeper expires it and releases seats.
#[tokio::test]
async fn expiry_sweep_reclaims_overdue_booking() {
    // No payment consumer wired: the booking stays PENDING forever, as
    // if the payment result were lost.
    let kv = Arc::new(MemoryKvStore::new());
    let locks = Arc::new(SeatLockService::new(kv));
    let bookings = Arc::new(MemoryBookingStore::new());
    let bus = Arc::new(MemoryBus::with_defaults());
    let publisher = RetryingPublisher::with_retries(bus, 1, Duration::from_millis(1));
    let saga = Arc::new(BookingSaga::new(
        bookings.clone(),
        locks.clone(),
        Arc::new(StaticCatalog::new()),
        publisher,
        SagaConfig {
            booking_expiry: Duration::ZERO,
            ..SagaConfig::default()
        },
    ));
    let sweeper = ExpirySweeper::new(saga.clone(), ExpirySweeperConfig::default());

    let seat_ids = seats(&["B1"]);
    assert!(locks.try_lock_many(3, &seat_ids, 11).await.unwrap());
    let booking = saga
        .create_booking(11, 3, seat_ids, Decimal::new(50, 0))
        .await
        .unwrap();

    assert_eq!(sweeper.sweep_once().await.unwrap(), 1);

    let expired = saga.get_booking(booking.booking_id).await.unwrap().unwrap();
    assert_eq!(expired.status, BookingStatus::Expired);
    assert!(!locks.is_locked(3, "B1").await.unwrap());

    // A late payment result must not resurrect the booking.
    saga.on_payment_success(booking.booking_id).await.unwrap();
    let still_expired = saga.get_booking(booking.booking_id).await.unwrap().unwrap();
    assert_eq!(still_expired.status, BookingStatus::Expired);
}

/// Booking without owned locks is rejected before any state change.
#[tokio::test]
async fn booking_without_locks_rejected() {
    let p = pipeline(MockGateway::approving(), Duration::from_secs(600));

    let result = p
        .saga
        .create_booking(7, 1, seats(&["Z9"]), Decimal::new(100, 0))
        .await;
    assert!(result.is_err());
    assert!(p.bookings.list_for_user(7).await.unwrap().is_empty());
}

/// Cancellation path: PENDING booking cancelled by its owner, seats
/// freed, confirmed bookings immune.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_flow() {
    // Gateway latency keeps the booking PENDING long enough to cancel.
    let p = pipeline(
        MockGateway::with_behaviour(1.0, Duration::from_millis(300)),
        Duration::from_secs(600),
    );
    let seat_ids = seats(&["C1"]);

    assert!(p.locks.try_lock_many(1, &seat_ids, 7).await.unwrap());
    let booking = p
        .saga
        .create_booking(7, 1, seat_ids, Decimal::new(75, 0))
        .await
        .unwrap();

    p.saga.cancel(booking.booking_id, 7).await.unwrap();

    let cancelled = p
        .saga
        .get_booking(booking.booking_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert!(!p.locks.is_locked(1, "C1").await.unwrap());

    // The late PaymentSuccess for the cancelled booking is ignored.
    tokio::time::sleep(Duration::from_millis(800)).await;
    let still_cancelled = p
        .saga
        .get_booking(booking.booking_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(still_cancelled.status, BookingStatus::Cancelled);
}
