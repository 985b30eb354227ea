//! Payment error types

use thiserror::Error;

/// Payment engine errors
///
/// Error codes are stable strings used in API responses and logs.
#[derive(Error, Debug, Clone)]
pub enum PaymentError {
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Charge outcome unknown within the deadline. The transaction stays
    /// PENDING; only the sweeper may resolve it.
    #[error("Payment gateway timed out")]
    GatewayTimeout,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal payment error: {0}")]
    Internal(String),
}

impl PaymentError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            PaymentError::GatewayTimeout => "GATEWAY_TIMEOUT",
            PaymentError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            PaymentError::DatabaseError(_) => "STORE_UNAVAILABLE",
            PaymentError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            PaymentError::TransactionNotFound(_) => 404,
            PaymentError::GatewayTimeout => 504,
            PaymentError::GatewayUnavailable(_) => 503,
            PaymentError::DatabaseError(_) => 503,
            PaymentError::Internal(_) => 500,
        }
    }
}

impl From<sqlx::Error> for PaymentError {
    fn from(e: sqlx::Error) -> Self {
        PaymentError::DatabaseError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PaymentError::GatewayTimeout.code(), "GATEWAY_TIMEOUT");
        assert_eq!(
            PaymentError::DatabaseError("down".into()).code(),
            "STORE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(PaymentError::TransactionNotFound("x".into()).http_status(), 404);
        assert_eq!(PaymentError::DatabaseError("x".into()).http_status(), 503);
        assert_eq!(PaymentError::GatewayTimeout.http_status(), 504);
    }
}
