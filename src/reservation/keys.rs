//! Lock store key grammar
//!
//! Cross-service cooperation depends on these exact encodings; never
//! build a reservation key anywhere else.

use crate::core_types::EventId;

/// Per-seat lock key: `lock:event:{eventId}:seat:{seatId}`
pub fn seat_lock_key(event_id: EventId, seat_id: &str) -> String {
    format!("lock:event:{}:seat:{}", event_id, seat_id)
}

/// Prefix matching every seat lock of one event.
pub fn seat_lock_prefix(event_id: EventId) -> String {
    format!("lock:event:{}:seat:", event_id)
}

/// Tatkal counter key: `inventory:event:{eventId}`
pub fn inventory_key(event_id: EventId) -> String {
    format!("inventory:event:{}", event_id)
}

/// Recover the seat id from a full seat lock key.
pub fn seat_id_from_key<'a>(key: &'a str, event_id: EventId) -> Option<&'a str> {
    key.strip_prefix(&seat_lock_prefix(event_id))
}
