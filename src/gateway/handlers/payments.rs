//! Payment handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use super::super::state::AppState;
use super::super::types::{ApiError, TransactionView};

/// GET /payments/{transactionId}
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    let id: Uuid = transaction_id
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid transaction ID format"))?;

    let txn = state
        .transactions
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("TRANSACTION_NOT_FOUND", "Transaction not found"))?;

    Ok(Json(txn.into()))
}
