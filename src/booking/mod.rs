//! Booking Saga
//!
//! State machine coordinating Reservation → Booking → Payment →
//! Confirm/Fail/Expire across asynchronous event exchanges.
//!
//! # State Machine
//!
//! ```text
//!            create_booking
//!             ─────────▶ PENDING
//!                        │  │  │
//!    PaymentSuccess ─────┘  │  └──── cancel ─▶ CANCELLED
//!        │                  ├──── PaymentFailed ─▶ FAILED
//!        ▼                  └──── expires_at < now ─▶ EXPIRED
//!    CONFIRMED (terminal)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Status-guarded transitions**: every transition is a CAS on the
//!    current status, so replayed events and the expiry sweeper can race
//!    freely without double transitions.
//! 2. **Terminal means terminal**: CONFIRMED, FAILED, CANCELLED and
//!    EXPIRED never transition again; late events are logged and ignored.
//! 3. **Locks released on every terminal transition**; release failures
//!    are non-fatal because the lock TTL is the safety net.

pub mod error;
pub mod saga;
pub mod store;
pub mod sweeper;
pub mod types;

pub use error::BookingError;
pub use saga::{BookingSaga, PaymentResultHandler, SagaConfig};
pub use store::{BookingStore, MemoryBookingStore, PgBookingStore};
pub use sweeper::{ExpirySweeper, ExpirySweeperConfig};
pub use types::{Booking, BookingStatus};
