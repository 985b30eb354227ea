use std::sync::Arc;

use crate::booking::BookingSaga;
use crate::payment::TransactionStore;
use crate::reservation::{SeatLockService, TatkalInventory};

/// Gateway application state (shared)
#[derive(Clone)]
pub struct AppState {
    /// Seat lock service (VISUAL mode)
    pub locks: Arc<SeatLockService>,
    /// Tatkal counter service (FCFS mode)
    pub inventory: Arc<TatkalInventory>,
    /// Booking saga
    pub saga: Arc<BookingSaga>,
    /// Transaction store (payment lookups)
    pub transactions: Arc<dyn TransactionStore>,
}

impl AppState {
    pub fn new(
        locks: Arc<SeatLockService>,
        inventory: Arc<TatkalInventory>,
        saga: Arc<BookingSaga>,
        transactions: Arc<dyn TransactionStore>,
    ) -> Self {
        Self {
            locks,
            inventory,
            saga,
            transactions,
        }
    }
}
