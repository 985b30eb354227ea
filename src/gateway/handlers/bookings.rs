//! Booking handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use super::super::state::AppState;
use super::super::types::{ApiError, BookingView, CreateBookingRequest, UserQuery};
use crate::core_types::{BookingId, UserId};

/// POST /bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingView>), ApiError> {
    let booking = state
        .saga
        .create_booking(req.user_id, req.event_id, req.seat_ids, req.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// GET /bookings/{id}?userId=...
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<BookingId>,
    Query(query): Query<UserQuery>,
) -> Result<Json<BookingView>, ApiError> {
    let booking = state
        .saga
        .get_booking(booking_id)
        .await?
        .ok_or_else(|| ApiError::not_found("BOOKING_NOT_FOUND", "Booking not found"))?;

    if booking.user_id != query.user_id {
        return Err(ApiError::forbidden("Booking belongs to another user"));
    }

    Ok(Json(booking.into()))
}

/// GET /bookings/user/{userId}
pub async fn list_user_bookings(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let bookings = state.saga.bookings_for_user(user_id).await?;
    Ok(Json(bookings.into_iter().map(BookingView::from).collect()))
}

/// DELETE /bookings/{id}?userId=...
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<BookingId>,
    Query(query): Query<UserQuery>,
) -> Result<StatusCode, ApiError> {
    state.saga.cancel(booking_id, query.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
