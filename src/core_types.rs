//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// Event ID - globally unique identifier for a ticketed event.
///
/// # Constraints:
/// - **Immutable**: Once assigned, NEVER changes
/// - Appears verbatim in the lock-store key grammar
///   (`lock:event:{eventId}:seat:{seatId}`), so other services
///   depend on its integer encoding.
pub type EventId = u64;

/// User ID - globally unique, immutable after assignment.
///
/// Supplied by the (external) auth service; the core treats it as
/// an already-verified opaque integer.
pub type UserId = u64;

/// Booking ID - monotonic, unique within the system.
///
/// Generated by a Snowflake-style generator so ids sort by creation
/// time without coordination.
pub type BookingId = u64;

/// Seat ID - row/number label within an event's layout (e.g. "A1", "VIP3").
///
/// Seat ids are opaque strings to the core; only the catalog service
/// knows the layout they come from.
pub type SeatId = String;
