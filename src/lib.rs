//! boxoffice - High-Concurrency Event Ticketing Core
//!
//! The concurrency-critical reservation pipeline of a ticketing backend:
//! thousands of simultaneous buyers contending for the same seats, with
//! no seat ever double-sold and no buyer ever double-charged.
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (EventId, UserId, etc.)
//! - [`config`] - Application configuration
//! - [`kvstore`] - Lock store primitive (named locks + atomic counters)
//! - [`reservation`] - Seat locking (VISUAL) and Tatkal inventory (FCFS)
//! - [`events`] - Saga event contracts and typed topics
//! - [`bus`] - Event bus adapter (partitions, consumer groups, DLQ)
//! - [`outbox`] - Durable publication for the Postgres deployment
//! - [`payment`] - Idempotent payment engine and sweeper
//! - [`booking`] - Booking saga, stores and expiry sweeper
//! - [`catalog`] - External event-catalog seam
//! - [`gateway`] - HTTP surface

// Core types - must be first!
pub mod core_types;

// Configuration & observability
pub mod config;
pub mod logging;

// Reservation pipeline
pub mod booking;
pub mod bus;
pub mod catalog;
pub mod events;
pub mod gateway;
pub mod kvstore;
pub mod outbox;
pub mod payment;
pub mod reservation;

// Convenient re-exports at crate root
pub use booking::{Booking, BookingError, BookingSaga, BookingStatus, BookingStore, ExpirySweeper};
pub use bus::{EventBus, EventHandler, MemoryBus, RetryingPublisher};
pub use config::AppConfig;
pub use core_types::{BookingId, EventId, SeatId, UserId};
pub use events::Topic;
pub use kvstore::{KvStore, MemoryKvStore};
pub use payment::{PaymentEngine, PaymentError, Transaction, TransactionStatus, TransactionStore};
pub use reservation::{SeatLockService, TatkalInventory};
