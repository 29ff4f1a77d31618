// src/handlers/wallet.rs

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use super::page_limit;
use crate::{
    error::AppError,
    ledger::Ledger,
    models::wallet::{TransactionListParams, WalletAmountRequest},
    utils::{html::clean_optional, jwt::CurrentUser},
};

pub async fn get_wallet(
    State(ledger): State<Ledger>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(ledger.wallet(user.id).await?))
}

/// Transaction history, newest first.
pub async fn list_transactions(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Query(params): Query<TransactionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let transactions = ledger
        .transactions(user.id, page_limit(params.limit))
        .await?;

    Ok(Json(transactions))
}

pub async fn credit(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Json(payload): Json<WalletAmountRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if payload.booking_id.is_some() {
        return Err(AppError::Validation(
            "booking_id can only be attached to a debit".to_string(),
        ));
    }

    let receipt = ledger
        .credit(
            user.id,
            payload.amount,
            clean_optional(payload.description.as_deref()),
            payload.idempotency_key,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Pay from the wallet, optionally against one of the caller's bookings.
pub async fn debit(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Json(payload): Json<WalletAmountRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if let Some(booking_id) = payload.booking_id {
        ledger
            .query("booking", |store| store.booking(booking_id))
            .await?
            .filter(|b| b.passenger_id == user.id || b.driver_id == user.id)
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
    }

    let receipt = ledger
        .debit(
            user.id,
            payload.amount,
            clean_optional(payload.description.as_deref()),
            payload.booking_id,
            payload.idempotency_key,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Checks the cached balance against the full history.
pub async fn reconcile(
    State(ledger): State<Ledger>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let balance = ledger.reconcile(user.id).await?;

    Ok(Json(json!({
        "balance": balance,
        "consistent": true,
    })))
}
