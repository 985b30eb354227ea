//! boxoffice - High-Concurrency Event Ticketing Core
//!
//! Entry point. Constructor wiring only, no container:
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌─────────┐   ┌──────────┐
//! │  Config  │──▶│ Lock Store  │──▶│  Saga   │──▶│ Gateway  │
//! │  (YAML)  │   │ + Stores    │   │ + Bus   │   │  (HTTP)  │
//! └──────────┘   └─────────────┘   └─────────┘   └──────────┘
//! ```
//!
//! With `DATABASE_URL` set the booking/transaction stores are
//! PostgreSQL-backed and publication goes through the durable outbox;
//! otherwise everything runs on the in-memory implementations.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use boxoffice::booking::{
    BookingSaga, BookingStore, ExpirySweeper, ExpirySweeperConfig, MemoryBookingStore,
    PgBookingStore, PaymentResultHandler, SagaConfig,
};
use boxoffice::bus::{BusConfig, EventBus, MemoryBus, RetryingPublisher};
use boxoffice::catalog::StaticCatalog;
use boxoffice::config::AppConfig;
use boxoffice::events::Topic;
use boxoffice::gateway::{self, AppState};
use boxoffice::kvstore::{KvStore, MemoryKvStore};
use boxoffice::logging::init_logging;
use boxoffice::outbox::{OutboxDrainer, OutboxDrainerConfig, PgOutbox};
use boxoffice::payment::{
    BookingCreatedHandler, HttpGateway, MemoryTransactionStore, MockGateway, PaymentEngine,
    PaymentGateway, PaymentSweeper, PaymentSweeperConfig, PgTransactionStore, TransactionStore,
};
use boxoffice::reservation::{SeatLockService, TatkalInventory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let config = AppConfig::load(config_path.as_deref())?;
    let _guard = init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        port = config.port,
        "Starting boxoffice"
    );

    // ==========================================================================
    // Lock store + reservation engine
    // ==========================================================================
    let kv = Arc::new(MemoryKvStore::new());
    {
        // Reclaim expired lock entries between accesses.
        let kv = kv.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                let purged = kv.purge_expired();
                if purged > 0 {
                    debug!(purged, "Purged expired lock-store entries");
                }
            }
        });
    }
    let kv_store: Arc<dyn KvStore> = kv;
    let locks = Arc::new(SeatLockService::with_ttl(kv_store.clone(), config.lock_ttl()));
    let inventory = Arc::new(TatkalInventory::new(kv_store));

    // ==========================================================================
    // Event bus
    // ==========================================================================
    let bus = Arc::new(MemoryBus::new(BusConfig {
        partitions: config.bus_partitions,
        max_attempts: config.consumer_dlq_after,
        ..BusConfig::default()
    }));

    // ==========================================================================
    // Stores + producer path (durable outbox with PostgreSQL, direct
    // publish otherwise)
    // ==========================================================================
    let booking_store: Arc<dyn BookingStore>;
    let txn_store: Arc<dyn TransactionStore>;
    let producer: Arc<dyn EventBus>;

    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(20).connect(url).await?;
            info!("PostgreSQL stores enabled");

            booking_store = Arc::new(PgBookingStore::new(pool.clone()));
            txn_store = Arc::new(PgTransactionStore::new(pool.clone()));

            let outbox = Arc::new(PgOutbox::new(pool));
            producer = outbox.clone();

            let drainer = OutboxDrainer::new(
                outbox,
                RetryingPublisher::with_retries(
                    bus.clone(),
                    config.bus_publish_retries,
                    Duration::from_millis(100),
                ),
                OutboxDrainerConfig::default(),
            );
            tokio::spawn(async move { drainer.run().await; });
        }
        None => {
            info!("No DATABASE_URL; using in-memory stores");
            booking_store = Arc::new(MemoryBookingStore::new());
            txn_store = Arc::new(MemoryTransactionStore::new());
            producer = bus.clone();
        }
    }

    let publisher = RetryingPublisher::with_retries(
        producer,
        config.bus_publish_retries,
        Duration::from_millis(100),
    );

    // ==========================================================================
    // Saga + payment engine
    // ==========================================================================
    let catalog = Arc::new(StaticCatalog::new());
    let saga = Arc::new(BookingSaga::new(
        booking_store,
        locks.clone(),
        catalog,
        publisher.clone(),
        SagaConfig {
            booking_expiry: config.booking_expiry(),
            ..SagaConfig::default()
        },
    ));

    let payment_gateway: Arc<dyn PaymentGateway> = match &config.payment_gateway_url {
        Some(url) => {
            info!(url = %url, "Using HTTP payment gateway");
            Arc::new(HttpGateway::new(url, config.gateway_timeout())?)
        }
        None => {
            info!(
                success_rate = config.mock_success_rate,
                "Using mock payment gateway"
            );
            Arc::new(MockGateway::with_behaviour(
                config.mock_success_rate,
                config.mock_latency(),
            ))
        }
    };

    let engine = Arc::new(PaymentEngine::with_timeout(
        txn_store.clone(),
        payment_gateway.clone(),
        publisher,
        config.gateway_timeout(),
    ));

    // ==========================================================================
    // Consumers - subscribed before the server accepts traffic
    // ==========================================================================
    bus.subscribe(
        Topic::BookingCreated,
        "payment-engine",
        Arc::new(BookingCreatedHandler::new(engine.clone())),
    );
    let payment_results = Arc::new(PaymentResultHandler::new(saga.clone()));
    bus.subscribe(Topic::PaymentSuccess, "booking-saga", payment_results.clone());
    bus.subscribe(Topic::PaymentFailed, "booking-saga", payment_results);

    // ==========================================================================
    // Background sweepers
    // ==========================================================================
    let expiry_sweeper = ExpirySweeper::new(
        saga.clone(),
        ExpirySweeperConfig {
            scan_interval: config.expiry_sweep_interval(),
            ..ExpirySweeperConfig::default()
        },
    );
    tokio::spawn(async move { expiry_sweeper.run().await; });

    let payment_sweeper = PaymentSweeper::new(
        txn_store.clone(),
        payment_gateway,
        engine,
        PaymentSweeperConfig {
            scan_interval: config.payment_sweep_interval(),
            ..PaymentSweeperConfig::default()
        },
    );
    tokio::spawn(async move { payment_sweeper.run().await; });

    // ==========================================================================
    // HTTP gateway
    // ==========================================================================
    let state = Arc::new(AppState::new(locks, inventory, saga, txn_store));
    gateway::run_server(config.port, state).await;

    Ok(())
}
