//! Reservation Engine
//!
//! Two independent sub-APIs sharing the lock store:
//!
//! - **Seat locking** (VISUAL mode): per-seat named locks with TTL and
//!   ownership, for buyers who pick specific seats.
//! - **Tatkal inventory** (FCFS mode): a single atomic counter per event,
//!   for buyers who take any seat of a pool.
//!
//! Both sides speak the shared key grammar in [`keys`]; other services
//! cooperate through those exact encodings.

pub mod inventory;
pub mod keys;
pub mod locks;

pub use inventory::TatkalInventory;
pub use locks::SeatLockService;
