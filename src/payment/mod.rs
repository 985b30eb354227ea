//! Payment Engine
//!
//! Idempotent charge processing against an external gateway.
//!
//! # Exactly-once charging
//!
//! The bus delivers `booking.created` at least once; the gateway must be
//! invoked at most once per booking. The bridge between the two is the
//! idempotency key `booking_{bookingId}_user_{userId}`, unique-indexed on
//! the transaction row:
//!
//! 1. An existing row for the key short-circuits processing.
//! 2. Losing an insert race converges on the winner's row.
//! 3. The charge runs only after this process owns the PENDING row.
//!
//! # Safety Invariants
//!
//! 1. **Never re-charge a completed transaction**: SUCCESS/FAILED rows are
//!    terminal; replays re-emit their result event, nothing else.
//! 2. **Timeout leaves PENDING**: an unanswered charge is neither success
//!    nor failure; the payment sweeper resolves it via gateway lookup.
//! 3. The transaction row is the source of truth; publication is
//!    retried/replayed around it, never the other way.

pub mod engine;
pub mod error;
pub mod gateway;
pub mod store;
pub mod sweeper;
pub mod types;

pub use engine::{BookingCreatedHandler, PaymentEngine};
pub use error::PaymentError;
pub use gateway::{
    ChargeOutcome, ChargeRequest, GatewayError, HttpGateway, MockGateway, PaymentGateway,
};
pub use store::{InsertOutcome, MemoryTransactionStore, PgTransactionStore, TransactionStore};
pub use sweeper::{PaymentSweeper, PaymentSweeperConfig};
pub use types::{Transaction, TransactionStatus, idempotency_key};
