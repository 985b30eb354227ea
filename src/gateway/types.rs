//! API request/response types and the unified error wrapper
//!
//! - Request/response DTOs are camelCase on the wire.
//! - `ApiError`: unified error type with IntoResponse; domain errors
//!   convert into it so handlers use `?` throughout.

use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::booking::{Booking, BookingError};
use crate::core_types::{BookingId, EventId, SeatId, UserId};
use crate::kvstore::StoreError;
use crate::payment::{PaymentError, Transaction};

// ============================================================================
// ApiError: Unified Error Type
// ============================================================================

/// Unified API error with automatic IntoResponse
///
/// Body shape: `{"error": "<CODE>", "message": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_PARAMETER", msg)
    }

    /// 404 Not Found
    pub fn not_found(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, msg)
    }

    /// 403 Forbidden
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg)
    }

    /// 503 Service Unavailable (lock store / database down)
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ApiErrorBody {
            error: self.code,
            message: &self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match &e {
            StoreError::Unavailable(_) => Self::service_unavailable(e.to_string()),
            StoreError::NotAnInteger(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                e.to_string(),
            ),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.code(), e.to_string())
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.code(), e.to_string())
    }
}

// ============================================================================
// Inventory DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRequest {
    pub event_id: EventId,
    pub seat_id: SeatId,
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockManyRequest {
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatCheckResponse {
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserId>,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStatusResponse {
    pub locked_seats_count: usize,
    pub locked_seats: Vec<SeatId>,
    pub tatkal_remaining: i64,
    pub tatkal_sold_out: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TatkalInitQuery {
    pub total_seats: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TatkalResponse {
    pub success: bool,
    pub remaining_seats: i64,
}

// ============================================================================
// Booking DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub user_id: UserId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: UserId,
}

/// Booking response data
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub seat_ids: Vec<SeatId>,
    pub amount: Decimal,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl From<Booking> for BookingView {
    fn from(b: Booking) -> Self {
        Self {
            booking_id: b.booking_id,
            user_id: b.user_id,
            event_id: b.event_id,
            seat_ids: b.seat_ids,
            amount: b.amount,
            status: b.status.as_str(),
            created_at: b.created_at,
            confirmed_at: b.confirmed_at,
            expires_at: b.expires_at,
        }
    }
}

// ============================================================================
// Payment DTOs
// ============================================================================

/// Transaction response data
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub transaction_id: String,
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionView {
    fn from(t: Transaction) -> Self {
        Self {
            transaction_id: t.transaction_id.to_string(),
            booking_id: t.booking_id,
            user_id: t.user_id,
            amount: t.amount,
            currency: t.currency,
            status: t.status.as_str(),
            gateway_reference: t.gateway_reference,
            failure_reason: t.failure_reason,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

// ============================================================================
// Health DTO
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub git_hash: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_request_wire_format() {
        let raw = r#"{"eventId": 1, "seatId": "VIP1", "userId": 42}"#;
        let req: LockRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.event_id, 1);
        assert_eq!(req.seat_id, "VIP1");
        assert_eq!(req.user_id, 42);
    }

    #[test]
    fn test_lock_response_omits_absent_fields() {
        let response = LockResponse {
            success: true,
            owner: Some(42),
            ttl_seconds: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["owner"], 42);
        assert!(json.get("ttlSeconds").is_none());
    }

    #[test]
    fn test_booking_view_status_string() {
        let booking = Booking::pending(
            1,
            2,
            3,
            vec!["A1".to_string()],
            Decimal::new(100, 0),
            std::time::Duration::from_secs(600),
        );
        let json = serde_json::to_value(BookingView::from(booking)).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["seatIds"][0], "A1");
        assert!(json.get("confirmedAt").is_none());
    }
}
