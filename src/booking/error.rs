//! Booking error types

use thiserror::Error;

use crate::kvstore::StoreError;

/// Booking saga errors
///
/// Error codes are stable strings surfaced in API responses.
#[derive(Error, Debug, Clone)]
pub enum BookingError {
    // === Validation Errors ===
    #[error("User ID missing or invalid")]
    Forbidden,

    #[error("Seat list is empty")]
    NoSeatsRequested,

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    /// The caller does not hold live locks on every requested seat.
    #[error("Seats not owned by the requesting user")]
    SeatsNotOwned,

    // === Lifecycle Errors ===
    #[error("Booking not found: {0}")]
    BookingNotFound(u64),

    #[error("Confirmed bookings cannot be cancelled")]
    AlreadyConfirmed,

    #[error("Invalid state transition: {0}")]
    IllegalTransition(String),

    // === System Errors ===
    #[error("Lock store error: {0}")]
    LockStore(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl BookingError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::Forbidden => "FORBIDDEN",
            BookingError::NoSeatsRequested => "NO_SEATS_REQUESTED",
            BookingError::InvalidAmount => "INVALID_AMOUNT",
            BookingError::SeatsNotOwned => "SEATS_NOT_OWNED",
            BookingError::BookingNotFound(_) => "BOOKING_NOT_FOUND",
            BookingError::AlreadyConfirmed => "ALREADY_CONFIRMED",
            BookingError::IllegalTransition(_) => "ILLEGAL_TRANSITION",
            BookingError::LockStore(_) => "STORE_UNAVAILABLE",
            BookingError::DatabaseError(_) => "STORE_UNAVAILABLE",
            BookingError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            BookingError::Forbidden => 403,
            BookingError::NoSeatsRequested
            | BookingError::InvalidAmount
            | BookingError::SeatsNotOwned => 400,
            BookingError::BookingNotFound(_) => 404,
            BookingError::AlreadyConfirmed | BookingError::IllegalTransition(_) => 409,
            BookingError::LockStore(_) | BookingError::DatabaseError(_) => 503,
            BookingError::SystemError(_) => 500,
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => BookingError::LockStore(msg),
            StoreError::NotAnInteger(key) => {
                BookingError::SystemError(format!("Corrupt counter at {}", key))
            }
        }
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(e: sqlx::Error) -> Self {
        BookingError::DatabaseError(e.to_string())
    }
}
