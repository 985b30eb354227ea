//! Inventory handlers (seat locks + Tatkal counters)
//!
//! Losing a race is not an HTTP error: `success=false` with 200 tells
//! the client to pick another seat or retry. Only store unavailability
//! surfaces as 5xx.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};

use super::super::state::AppState;
use super::super::types::{
    ApiError, EventStatusResponse, LockManyRequest, LockRequest, LockResponse, ReleaseResponse,
    SeatCheckResponse, TatkalInitQuery, TatkalResponse,
};
use crate::core_types::EventId;

/// POST /inventory/lock
pub async fn lock_seat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LockRequest>,
) -> Result<Json<LockResponse>, ApiError> {
    let success = state
        .locks
        .try_lock(req.event_id, &req.seat_id, req.user_id)
        .await?;

    // Report the live owner/TTL either way: the caller's own lock on
    // success, the competing owner on failure.
    let owner = state.locks.owner(req.event_id, &req.seat_id).await?;
    let ttl = state.locks.ttl(req.event_id, &req.seat_id).await?;

    Ok(Json(LockResponse {
        success,
        owner,
        ttl_seconds: (ttl >= 0).then_some(ttl),
    }))
}

/// POST /inventory/lock-multiple
pub async fn lock_many(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LockManyRequest>,
) -> Result<Json<LockResponse>, ApiError> {
    if req.seat_ids.is_empty() {
        return Err(ApiError::bad_request("seatIds must not be empty"));
    }

    let success = state
        .locks
        .try_lock_many(req.event_id, &req.seat_ids, req.user_id)
        .await?;

    Ok(Json(LockResponse {
        success,
        owner: success.then_some(req.user_id),
        ttl_seconds: None,
    }))
}

/// POST /inventory/release
pub async fn release_seat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LockRequest>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    let success = state
        .locks
        .release(req.event_id, &req.seat_id, req.user_id)
        .await?;
    Ok(Json(ReleaseResponse { success }))
}

/// GET /inventory/check/{eventId}/{seatId}
pub async fn check_seat(
    State(state): State<Arc<AppState>>,
    Path((event_id, seat_id)): Path<(EventId, String)>,
) -> Result<Json<SeatCheckResponse>, ApiError> {
    let owner = state.locks.owner(event_id, &seat_id).await?;
    let ttl = state.locks.ttl(event_id, &seat_id).await?;

    Ok(Json(SeatCheckResponse {
        locked: owner.is_some(),
        owner,
        ttl_seconds: ttl,
    }))
}

/// GET /inventory/status/{eventId}
pub async fn event_status(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> Result<Json<EventStatusResponse>, ApiError> {
    let locked_seats = state.locks.locked_seats_for_event(event_id).await?;
    let tatkal_remaining = state.inventory.remaining(event_id).await?;
    let tatkal_sold_out = state.inventory.is_sold_out(event_id).await?;

    Ok(Json(EventStatusResponse {
        locked_seats_count: locked_seats.len(),
        locked_seats,
        tatkal_remaining,
        tatkal_sold_out,
    }))
}

/// POST /inventory/tatkal/init/{eventId}?totalSeats=N
pub async fn tatkal_init(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
    Query(query): Query<TatkalInitQuery>,
) -> Result<Json<TatkalResponse>, ApiError> {
    state.inventory.initialize(event_id, query.total_seats).await?;
    Ok(Json(TatkalResponse {
        success: true,
        remaining_seats: query.total_seats as i64,
    }))
}

/// POST /inventory/tatkal/reserve/{eventId}
pub async fn tatkal_reserve(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> Result<Json<TatkalResponse>, ApiError> {
    let success = state.inventory.try_reserve(event_id).await?;
    let remaining_seats = state.inventory.remaining(event_id).await?;
    Ok(Json(TatkalResponse {
        success,
        remaining_seats,
    }))
}

/// POST /inventory/tatkal/release/{eventId}
pub async fn tatkal_release(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<EventId>,
) -> Result<Json<TatkalResponse>, ApiError> {
    state.inventory.release(event_id).await?;
    let remaining_seats = state.inventory.remaining(event_id).await?;
    Ok(Json(TatkalResponse {
        success: true,
        remaining_seats,
    }))
}
